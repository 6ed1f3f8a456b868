//! Per-request routing between the current cache store and the network.

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::{Origin, Url};

use crate::cache::{CacheStorage, CacheStore};
use crate::generation::GenerationManager;
use crate::http::{Request, RequestKey, Response};
use crate::network::Network;

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Same-origin cache hit
  Cache,
  /// Live network response
  Network,
  /// Network failed, the offline page was served instead
  OfflineFallback,
  /// Cross-origin network failed, a cached copy was served
  CacheFallback,
}

/// A response together with its source.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub response: Response,
  pub source: ResponseSource,
}

impl Resolved {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

/// Routing policy for intercepted requests.
///
/// Same-origin requests are cache-first: a hit is returned without touching
/// the network, a miss is fetched and written through on success, and a
/// failed fetch is answered with the offline page. Cross-origin requests are
/// network-first and only fall back to the cache when the fetch fails; they
/// are never written to the cache here.
pub struct Router<S: CacheStorage> {
  generations: Arc<GenerationManager<S>>,
  network: Arc<dyn Network>,
  origin: Origin,
  offline_page: RequestKey,
  /// Write-throughs still in flight
  pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStorage> Router<S> {
  pub fn new(
    generations: Arc<GenerationManager<S>>,
    network: Arc<dyn Network>,
    origin: &Url,
    offline_page: &Url,
  ) -> Self {
    Self {
      generations,
      network,
      origin: origin.origin(),
      offline_page: RequestKey::new("GET", offline_page),
      pending: Mutex::new(Vec::new()),
    }
  }

  pub fn is_same_origin(&self, request: &Request) -> bool {
    request.url.origin() == self.origin
  }

  /// Decide how to answer one intercepted request.
  pub async fn resolve(&self, request: &Request) -> Result<Resolved> {
    if self.is_same_origin(request) {
      self.cache_first(request).await
    } else {
      self.network_first(request).await
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<Resolved> {
    let key = request.key();

    if let Some(cached) = self.lookup(&key).await? {
      debug!(%key, "cache hit");
      return Ok(Resolved::new(cached, ResponseSource::Cache));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.write_through(key, &response);
        } else {
          debug!(%key, status = response.status, "not caching error response");
        }
        Ok(Resolved::new(response, ResponseSource::Network))
      }
      Err(e) => {
        warn!(%key, error = %e, "network failed, serving offline page");
        match self.lookup(&self.offline_page).await? {
          Some(page) => Ok(Resolved::new(page, ResponseSource::OfflineFallback)),
          None => Err(e),
        }
      }
    }
  }

  async fn network_first(&self, request: &Request) -> Result<Resolved> {
    match self.network.fetch(request).await {
      Ok(response) => Ok(Resolved::new(response, ResponseSource::Network)),
      Err(e) => {
        let key = request.key();
        warn!(%key, error = %e, "network failed, trying cache");
        match self.lookup(&key).await? {
          Some(cached) => Ok(Resolved::new(cached, ResponseSource::CacheFallback)),
          None => Err(e),
        }
      }
    }
  }

  /// Read from the current store off the async executor. A generation that
  /// was never installed has no entries.
  async fn lookup(&self, key: &RequestKey) -> Result<Option<Response>> {
    let generations = Arc::clone(&self.generations);
    let key = key.clone();

    tokio::task::spawn_blocking(move || match generations.installed()? {
      Some(store) => store.get(&key),
      None => Ok(None),
    })
    .await
    .map_err(|e| eyre!("Cache lookup task failed: {}", e))?
  }

  /// Store a copy of `response` in the background.
  fn write_through(&self, key: RequestKey, response: &Response) {
    // Cache stores only hold GET responses
    if key.method() != "GET" {
      debug!(%key, "not caching non-GET response");
      return;
    }

    let generations = Arc::clone(&self.generations);
    let copy = response.clone();
    let handle = tokio::task::spawn_blocking(move || {
      if let Err(e) = generations.current().and_then(|store| store.put(&key, &copy)) {
        warn!(%key, error = %e, "write-through failed");
      } else {
        debug!(%key, "cached network response");
      }
    });

    match self.pending.lock() {
      Ok(mut pending) => {
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
      }
      Err(e) => warn!(error = %e, "pending write list poisoned"),
    }
  }

  /// Wait for every write-through started so far.
  pub async fn settle(&self) {
    let handles = match self.pending.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(_) => return,
    };

    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "write-through task failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::testing::{manifest, origin, page, request, FakeNetwork, FONTS, ORIGIN};

  struct Fixture {
    storage: Arc<MemoryStorage>,
    network: Arc<FakeNetwork>,
    router: Router<MemoryStorage>,
  }

  impl Fixture {
    fn new() -> Self {
      let storage = Arc::new(MemoryStorage::new());
      let network = Arc::new(FakeNetwork::new());
      let generations = Arc::new(GenerationManager::new(Arc::clone(&storage), "app-v2"));
      let manifest = manifest();
      let router = Router::new(
        generations,
        network.clone(),
        &origin(),
        manifest.offline_page(),
      );
      Self {
        storage,
        network,
        router,
      }
    }

    fn store(&self) -> crate::cache::MemoryCache {
      self.storage.open("app-v2").unwrap()
    }

    fn cache(&self, url: &str, response: Response) {
      self.store().put(&request(url).key(), &response).unwrap();
    }
  }

  fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
  }

  #[tokio::test]
  async fn test_cache_hit_skips_network() {
    let fx = Fixture::new();
    fx.cache(&url("/app.js"), page("cached"));
    fx.network.serve(&url("/app.js"), page("fresh"));

    let resolved = fx.router.resolve(&request(&url("/app.js"))).await.unwrap();

    assert_eq!(resolved.source, ResponseSource::Cache);
    assert_eq!(resolved.response.body, b"cached".to_vec());
    assert_eq!(fx.network.calls(), 0);
  }

  #[tokio::test]
  async fn test_miss_is_written_through() {
    let fx = Fixture::new();
    fx.network.serve(&url("/report.html"), page("report"));

    let first = fx
      .router
      .resolve(&request(&url("/report.html")))
      .await
      .unwrap();
    fx.router.settle().await;
    let second = fx
      .router
      .resolve(&request(&url("/report.html")))
      .await
      .unwrap();

    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response, first.response);
    assert_eq!(fx.network.calls_to(&url("/report.html")), 1);
  }

  #[tokio::test]
  async fn test_error_status_is_not_cached() {
    let fx = Fixture::new();
    fx.network.serve(&url("/missing"), Response::new(404));

    let resolved = fx.router.resolve(&request(&url("/missing"))).await.unwrap();
    fx.router.settle().await;

    assert_eq!(resolved.response.status, 404);
    assert!(fx.store().keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_post_is_not_cached() {
    let fx = Fixture::new();
    fx.network.serve(&url("/api/tx"), Response::new(201));

    let post = request(&url("/api/tx")).with_method("POST");
    let resolved = fx.router.resolve(&post).await.unwrap();
    fx.router.settle().await;

    assert_eq!(resolved.response.status, 201);
    assert!(fx.store().keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_miss_serves_offline_page() {
    let fx = Fixture::new();
    fx.cache(&url("/index.html"), page("index"));

    let resolved = fx
      .router
      .resolve(&request(&url("/reports/2024")))
      .await
      .unwrap();

    assert_eq!(resolved.source, ResponseSource::OfflineFallback);
    assert_eq!(resolved.response.body, b"index".to_vec());
    assert_eq!(fx.network.calls(), 1);
  }

  #[tokio::test]
  async fn test_offline_miss_without_offline_page_fails() {
    let fx = Fixture::new();

    let result = fx.router.resolve(&request(&url("/reports/2024"))).await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_cross_origin_prefers_network() {
    let fx = Fixture::new();
    let font = format!("{}/fonts.css", FONTS);
    fx.cache(&font, page("stale"));
    fx.network.serve(&font, page("live"));

    let resolved = fx.router.resolve(&request(&font)).await.unwrap();
    fx.router.settle().await;

    assert_eq!(resolved.source, ResponseSource::Network);
    assert_eq!(resolved.response.body, b"live".to_vec());
    let cached = fx.store().get(&request(&font).key()).unwrap().unwrap();
    assert_eq!(cached.body, b"stale".to_vec());
  }

  #[tokio::test]
  async fn test_cross_origin_success_is_not_cached() {
    let fx = Fixture::new();
    let font = format!("{}/font.woff2", FONTS);
    fx.network.serve(&font, page("woff"));

    fx.router.resolve(&request(&font)).await.unwrap();
    fx.router.settle().await;

    assert!(fx.store().keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_failure_uses_cache() {
    let fx = Fixture::new();
    let font = format!("{}/fonts.css", FONTS);
    fx.cache(&font, page("cached font"));

    let resolved = fx.router.resolve(&request(&font)).await.unwrap();

    assert_eq!(resolved.source, ResponseSource::CacheFallback);
    assert_eq!(resolved.response.body, b"cached font".to_vec());
  }

  #[tokio::test]
  async fn test_cross_origin_failure_never_serves_offline_page() {
    let fx = Fixture::new();
    fx.cache(&url("/index.html"), page("index"));

    let result = fx
      .router
      .resolve(&request(&format!("{}/other.css", FONTS)))
      .await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_serving_does_not_create_store() {
    let fx = Fixture::new();
    let font = format!("{}/font.woff2", FONTS);
    fx.network.serve(&font, page("woff"));

    fx.router.resolve(&request(&font)).await.unwrap();
    let _ = fx.router.resolve(&request(&url("/offline"))).await;
    fx.router.settle().await;

    assert!(fx.storage.names().unwrap().is_empty());
  }

  #[test]
  fn test_origin_includes_port_and_scheme() {
    let fx = Fixture::new();
    assert!(fx.router.is_same_origin(&request("https://app.test/x")));
    assert!(!fx.router.is_same_origin(&request("http://app.test/x")));
    assert!(!fx.router.is_same_origin(&request("https://app.test:8443/x")));
  }
}
