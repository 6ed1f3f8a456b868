//! Seams to the embedding host: notifications, windows, clients and uploads.

use color_eyre::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Opaque data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Where a click on the notification should navigate
  pub url: String,
}

/// A notification as handed to the host for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
}

/// The host environment the worker runs in.
pub trait Host: Send + Sync {
  fn show_notification(&self, notification: Notification) -> BoxFuture<'_, Result<()>>;

  fn close_notification(&self, notification: &Notification);

  /// Focus an existing window at `url` or open a new one.
  fn open_window(&self, url: Url) -> BoxFuture<'_, Result<()>>;

  /// Take control of already-open pages without waiting for a reload.
  fn claim_clients(&self) -> BoxFuture<'_, Result<()>>;
}

/// Deferred upload run on background sync.
pub trait Uploader: Send + Sync {
  fn upload(&self) -> BoxFuture<'_, Result<()>>;
}

/// Acknowledges every sync without uploading anything.
pub struct NoopUploader;

impl Uploader for NoopUploader {
  fn upload(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async {
      info!("background sync: transactions synced");
      Ok(())
    })
  }
}

/// Host used by the command line: every request is reported on stdout.
pub struct ConsoleHost;

impl Host for ConsoleHost {
  fn show_notification(&self, notification: Notification) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
      info!(title = %notification.title, "showing notification");
      let json = serde_json::to_string_pretty(&notification)?;
      println!("{}", json);
      Ok(())
    })
  }

  fn close_notification(&self, notification: &Notification) {
    info!(title = %notification.title, "closing notification");
  }

  fn open_window(&self, url: Url) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
      info!(%url, "opening window");
      println!("open {}", url);
      Ok(())
    })
  }

  fn claim_clients(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async {
      info!("claimed open clients");
      Ok(())
    })
  }
}
