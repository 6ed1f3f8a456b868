//! The worker: one owned object exposing a handler per event kind.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::config::{Config, NotificationConfig, ASSETS, GENERATION, OFFLINE_PAGE, SYNC_TAG};
use crate::generation::{GenerationManager, Manifest};
use crate::host::{Host, NoopUploader, Notification, NotificationData, Uploader};
use crate::http::Request;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::network::Network;
use crate::router::{Resolved, Router};

/// Optional JSON body of a push message.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  url: Option<String>,
}

/// Offline-first worker for a single origin.
pub struct Worker<S: CacheStorage> {
  lifecycle: Lifecycle,
  generations: Arc<GenerationManager<S>>,
  router: Router<S>,
  network: Arc<dyn Network>,
  host: Arc<dyn Host>,
  uploader: Arc<dyn Uploader>,
  manifest: Manifest,
  origin: Url,
  notifications: NotificationConfig,
}

impl<S: CacheStorage> Worker<S> {
  /// Worker for the built-in generation and asset manifest.
  pub fn new(
    storage: Arc<S>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    config: &Config,
  ) -> Result<Self> {
    let manifest = Manifest::resolve(&config.origin, ASSETS, OFFLINE_PAGE)?;
    Ok(Self::for_generation(
      GENERATION, manifest, storage, network, host, config,
    ))
  }

  pub fn for_generation(
    generation: &str,
    manifest: Manifest,
    storage: Arc<S>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    config: &Config,
  ) -> Self {
    let generations = Arc::new(GenerationManager::new(storage, generation));
    let router = Router::new(
      Arc::clone(&generations),
      Arc::clone(&network),
      &config.origin,
      manifest.offline_page(),
    );

    Self {
      lifecycle: Lifecycle::new(),
      generations,
      router,
      network,
      host,
      uploader: Arc::new(NoopUploader),
      manifest,
      origin: config.origin.clone(),
      notifications: config.notifications.clone(),
    }
  }

  pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
    self.uploader = uploader;
    self
  }

  pub fn state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  pub fn is_skipping_waiting(&self) -> bool {
    self.lifecycle.is_skipping_waiting()
  }

  pub fn generations(&self) -> &GenerationManager<S> {
    &self.generations
  }

  /// Install the current generation, then skip the waiting phase.
  pub async fn on_install(&self) -> Result<()> {
    self.lifecycle.transition(LifecycleState::Installing)?;

    if let Err(e) = self
      .generations
      .ensure_current_generation(self.network.as_ref(), &self.manifest)
      .await
    {
      self.lifecycle.transition(LifecycleState::Redundant)?;
      return Err(e);
    }

    self.lifecycle.transition(LifecycleState::Installed)?;
    self.lifecycle.skip_waiting();
    Ok(())
  }

  /// Evict stale generations, become active and claim open pages.
  pub async fn on_activate(&self) -> Result<()> {
    self.lifecycle.transition(LifecycleState::Activating)?;
    self.activate().await
  }

  /// Bring back a worker whose generation was installed by an earlier run.
  ///
  /// Runs the same activation as a fresh install, so generations left over
  /// by a run that never activated are still evicted.
  pub async fn resume(&self) -> Result<()> {
    if !self.generations.is_installed()? {
      return Err(eyre!(
        "Generation {} is not installed; run install first",
        self.generations.generation()
      ));
    }
    self.lifecycle.transition(LifecycleState::Activating)?;
    self.activate().await
  }

  async fn activate(&self) -> Result<()> {
    match self.generations.prune_other_generations() {
      Ok(deleted) if !deleted.is_empty() => info!(?deleted, "pruned stale generations"),
      Ok(_) => {}
      Err(e) => warn!(error = %e, "failed to prune stale generations"),
    }

    self.lifecycle.transition(LifecycleState::Active)?;
    self.host.claim_clients().await
  }

  /// Answer an intercepted request.
  pub async fn on_fetch(&self, request: &Request) -> Result<Resolved> {
    let state = self.lifecycle.state();
    if !state.can_intercept_fetch() {
      return Err(eyre!("Cannot handle fetch while {}", state));
    }

    let resolved = self.router.resolve(request).await?;
    debug!(url = %request.url, source = ?resolved.source, status = resolved.response.status, "resolved");
    Ok(resolved)
  }

  /// Run the upload for the transaction sync tag. Returns whether the tag was handled.
  pub async fn on_sync(&self, tag: &str) -> Result<bool> {
    if tag != SYNC_TAG {
      debug!(tag, "ignoring sync tag");
      return Ok(false);
    }

    self.uploader.upload().await?;
    Ok(true)
  }

  /// Show a notification for a push message.
  pub async fn on_push(&self, data: Option<&[u8]>) -> Result<()> {
    let payload = match data.map(|d| serde_json::from_slice::<PushPayload>(d)) {
      Some(Ok(payload)) => payload,
      Some(Err(e)) => {
        debug!(error = %e, "unparseable push payload, using defaults");
        PushPayload::default()
      }
      None => PushPayload::default(),
    };

    let defaults = &self.notifications;
    let notification = Notification {
      title: payload
        .title
        .unwrap_or_else(|| defaults.default_title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.default_body.clone()),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      vibrate: defaults.vibrate.clone(),
      data: NotificationData {
        url: payload.url.unwrap_or_else(|| defaults.default_url.clone()),
      },
    };

    self.host.show_notification(notification).await
  }

  /// Dismiss the notification and open its target page.
  pub async fn on_notification_click(&self, notification: &Notification) -> Result<()> {
    self.host.close_notification(notification);

    let url = self
      .origin
      .join(&notification.data.url)
      .map_err(|e| eyre!("Invalid notification URL {}: {}", notification.data.url, e))?;
    self.host.open_window(url).await
  }

  /// Wait for background cache writes to finish.
  pub async fn settle(&self) {
    self.router.settle().await;
  }
}
