use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::host::Notification;
use crate::http::{Request, Response};
use crate::router::Resolved;
use crate::worker::Worker;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Events delivered to the worker
#[derive(Debug)]
pub enum Event {
  Install(Reply<()>),
  Activate(Reply<()>),
  /// Intercepted request; the reply carries the response decision
  Fetch(Request, Reply<Resolved>),
  /// Background sync with its tag
  Sync(String, Reply<bool>),
  /// Push message with an optional payload
  Push(Option<Vec<u8>>, Reply<()>),
  NotificationClick(Notification, Reply<()>),
}

/// Handle used by the host to deliver events and await their completion
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
  async fn send<T>(&self, event: impl FnOnce(Reply<T>) -> Event) -> Result<T> {
    let (reply, done) = oneshot::channel();
    self
      .tx
      .send(event(reply))
      .map_err(|_| eyre!("Dispatcher has stopped"))?;
    done
      .await
      .map_err(|_| eyre!("Dispatcher dropped the event"))?
  }

  pub async fn install(&self) -> Result<()> {
    self.send(Event::Install).await
  }

  pub async fn activate(&self) -> Result<()> {
    self.send(Event::Activate).await
  }

  pub async fn fetch(&self, request: Request) -> Result<Response> {
    Ok(self.fetch_resolved(request).await?.response)
  }

  pub async fn fetch_resolved(&self, request: Request) -> Result<Resolved> {
    self.send(|reply| Event::Fetch(request, reply)).await
  }

  pub async fn sync(&self, tag: &str) -> Result<bool> {
    let tag = tag.to_string();
    self.send(|reply| Event::Sync(tag, reply)).await
  }

  pub async fn push(&self, data: Option<Vec<u8>>) -> Result<()> {
    self.send(|reply| Event::Push(data, reply)).await
  }

  pub async fn notification_click(&self, notification: Notification) -> Result<()> {
    self
      .send(|reply| Event::NotificationClick(notification, reply))
      .await
  }
}

/// Delivers events to the single worker instance.
///
/// Events are taken one at a time. Lifecycle, sync, push and click events are
/// awaited before the next event is taken; fetches run as independent tasks
/// so any number can be outstanding. A successful install whose worker skips
/// waiting is followed by activation right away.
pub struct Dispatcher<S: CacheStorage> {
  worker: Arc<Worker<S>>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl<S: CacheStorage> Dispatcher<S> {
  pub fn new(worker: Arc<Worker<S>>) -> (Self, EventSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { worker, rx }, EventSender { tx })
  }

  /// Run until every sender is dropped, then wait for pending cache writes.
  pub async fn run(mut self) {
    while let Some(event) = self.rx.recv().await {
      Self::dispatch(&self.worker, event).await;
    }

    debug!("event channel closed");
    self.worker.settle().await;
  }

  async fn dispatch(worker: &Arc<Worker<S>>, event: Event) {
    match event {
      Event::Install(reply) => {
        let mut result = worker.on_install().await;
        if result.is_ok() && worker.is_skipping_waiting() {
          info!("skipping waiting, activating");
          result = worker.on_activate().await;
        }
        respond(reply, result);
      }
      Event::Activate(reply) => respond(reply, worker.on_activate().await),
      Event::Fetch(request, reply) => {
        let worker = Arc::clone(worker);
        tokio::spawn(async move {
          let result = worker.on_fetch(&request).await;
          respond(reply, result);
        });
      }
      Event::Sync(tag, reply) => respond(reply, worker.on_sync(&tag).await),
      Event::Push(data, reply) => respond(reply, worker.on_push(data.as_deref()).await),
      Event::NotificationClick(notification, reply) => {
        respond(
          reply,
          worker.on_notification_click(&notification).await,
        );
      }
    }
  }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
  if let Err(e) = &result {
    warn!(error = %e, "event failed");
  }
  if reply.send(result).is_err() {
    debug!("event sender went away before completion");
  }
}
