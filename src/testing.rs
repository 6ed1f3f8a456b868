//! Fakes shared by the unit tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::generation::Manifest;
use crate::host::{Host, Notification, Uploader};
use crate::http::{Request, Response};
use crate::network::Network;

pub const ORIGIN: &str = "https://app.test";
pub const FONTS: &str = "https://fonts.test";

pub fn origin() -> Url {
  Url::parse(ORIGIN).unwrap()
}

pub fn manifest() -> Manifest {
  let fonts = format!("{}/fonts.css", FONTS);
  Manifest::resolve(
    &origin(),
    &["/", "/index.html", "/manifest.json", fonts.as_str()],
    "/index.html",
  )
  .unwrap()
}

pub fn request(url: &str) -> Request {
  Request::parse(url).unwrap()
}

/// Network that answers from a fixed table and counts every fetch.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Option<Response>>>,
  calls: Mutex<Vec<String>>,
  total: AtomicUsize,
}

impl FakeNetwork {
  /// A network where every URL is unreachable.
  pub fn new() -> Self {
    Self::default()
  }

  /// A network serving the test manifest.
  pub fn serving_manifest() -> Self {
    let network = Self::new();
    network.serve(&format!("{}/", ORIGIN), page("root"));
    network.serve(&format!("{}/index.html", ORIGIN), page("index"));
    network.serve(&format!("{}/manifest.json", ORIGIN), page("{}"));
    network.serve(&format!("{}/fonts.css", FONTS), page("@font-face {}"));
    network
  }

  pub fn serve(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Some(response));
  }

  /// Make a URL fail at the transport level.
  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(url.to_string(), None);
  }

  pub fn calls(&self) -> usize {
    self.total.load(Ordering::SeqCst)
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|u| u.as_str() == url)
      .count()
  }
}

pub fn page(body: &str) -> Response {
  Response::new(200)
    .with_header("content-type", "text/html")
    .with_body(body)
}

impl Network for FakeNetwork {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(async move {
      let url = request.url.to_string();
      self.total.fetch_add(1, Ordering::SeqCst);
      self.calls.lock().unwrap().push(url.clone());

      match self.routes.lock().unwrap().get(&url) {
        Some(Some(response)) => Ok(response.clone()),
        _ => Err(eyre!("network unreachable: {}", url)),
      }
    })
  }
}

/// Host that records what the worker asked of it.
#[derive(Default)]
pub struct RecordingHost {
  pub shown: Mutex<Vec<Notification>>,
  pub closed: Mutex<Vec<Notification>>,
  pub opened: Mutex<Vec<String>>,
  pub claims: AtomicUsize,
}

impl Host for RecordingHost {
  fn show_notification(&self, notification: Notification) -> BoxFuture<'_, Result<()>> {
    self.shown.lock().unwrap().push(notification);
    Box::pin(async { Ok(()) })
  }

  fn close_notification(&self, notification: &Notification) {
    self.closed.lock().unwrap().push(notification.clone());
  }

  fn open_window(&self, url: Url) -> BoxFuture<'_, Result<()>> {
    self.opened.lock().unwrap().push(url.to_string());
    Box::pin(async { Ok(()) })
  }

  fn claim_clients(&self) -> BoxFuture<'_, Result<()>> {
    self.claims.fetch_add(1, Ordering::SeqCst);
    Box::pin(async { Ok(()) })
  }
}

/// Uploader that counts calls and optionally fails.
#[derive(Default)]
pub struct CountingUploader {
  pub calls: AtomicUsize,
  pub fail: bool,
}

impl Uploader for CountingUploader {
  fn upload(&self) -> BoxFuture<'_, Result<()>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let fail = self.fail;
    Box::pin(async move {
      if fail {
        Err(eyre!("upload rejected"))
      } else {
        Ok(())
      }
    })
  }
}
