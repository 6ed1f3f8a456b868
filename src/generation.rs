//! Cache generations: installing the asset manifest and evicting stale stores.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, CacheStore};
use crate::http::{Credentials, Request, RequestKey, Response};
use crate::network::Network;

/// Resources to pre-cache for a generation, resolved against the worker origin.
#[derive(Debug, Clone)]
pub struct Manifest {
  entries: Vec<Url>,
  offline_page: Url,
}

impl Manifest {
  /// Resolve relative asset paths against `origin`. Absolute URLs are kept as-is.
  pub fn resolve(origin: &Url, assets: &[&str], offline_page: &str) -> Result<Self> {
    let join = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid manifest entry {}: {}", path, e))
    };

    Ok(Self {
      entries: assets.iter().map(|a| join(a)).collect::<Result<_>>()?,
      offline_page: join(offline_page)?,
    })
  }

  pub fn entries(&self) -> &[Url] {
    &self.entries
  }

  /// The page served when nothing else is available.
  pub fn offline_page(&self) -> &Url {
    &self.offline_page
  }
}

/// Owns the current generation identifier and the stores named after it.
pub struct GenerationManager<S: CacheStorage> {
  storage: Arc<S>,
  generation: String,
}

impl<S: CacheStorage> GenerationManager<S> {
  pub fn new(storage: Arc<S>, generation: impl Into<String>) -> Self {
    Self {
      storage,
      generation: generation.into(),
    }
  }

  pub fn generation(&self) -> &str {
    &self.generation
  }

  /// Open the current generation's store, creating it if absent.
  pub fn current(&self) -> Result<S::Store> {
    self.storage.open(&self.generation)
  }

  /// The current generation's store, if an install has completed.
  pub fn installed(&self) -> Result<Option<S::Store>> {
    self.storage.find(&self.generation)
  }

  pub fn is_installed(&self) -> Result<bool> {
    Ok(self.installed()?.is_some())
  }

  /// Populate the current store with the manifest.
  ///
  /// If any entry cannot be fetched the whole batch is dropped and only the
  /// offline page is installed, so the app stays usable offline even when
  /// optional assets (typically third-party fonts) are unreachable. The store
  /// is only created once a batch has been fetched, so a failed install
  /// leaves nothing behind.
  pub async fn ensure_current_generation(
    &self,
    network: &dyn Network,
    manifest: &Manifest,
  ) -> Result<()> {
    match fetch_all(network, manifest.entries()).await {
      Ok(entries) => {
        self.current()?.put_all(&entries)?;
        info!(
          generation = %self.generation,
          entries = manifest.entries().len(),
          "installed asset manifest"
        );
        Ok(())
      }
      Err(e) => {
        warn!(
          generation = %self.generation,
          error = %e,
          "manifest install failed, installing offline page only"
        );
        let entries = fetch_all(network, std::slice::from_ref(manifest.offline_page()))
          .await
          .map_err(|e| eyre!("Failed to install offline page: {}", e))?;
        self.current()?.put_all(&entries)?;
        info!(generation = %self.generation, "installed minimal manifest");
        Ok(())
      }
    }
  }

  /// Delete every store not named after the current generation.
  ///
  /// Returns the names that were deleted.
  pub fn prune_other_generations(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for name in self.storage.names()? {
      if name == self.generation {
        continue;
      }
      if self.storage.delete(&name)? {
        debug!(generation = %name, "deleted stale generation");
        deleted.push(name);
      }
    }

    Ok(deleted)
  }
}

/// Fetch every URL, failing if any fetch fails or returns an error status.
async fn fetch_all(network: &dyn Network, urls: &[Url]) -> Result<Vec<(RequestKey, Response)>> {
  let requests: Vec<Request> = urls
    .iter()
    .map(|url| Request::get(url.clone()).with_credentials(Credentials::SameOrigin))
    .collect();

  try_join_all(requests.iter().map(|request| async move {
    let response = network.fetch(request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "{} returned status {}",
        request.url,
        response.status
      ));
    }
    Ok::<_, color_eyre::Report>((request.key(), response))
  }))
  .await
}
