//! Core traits and types for the cache stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{RequestKey, Response};

/// A set of named cache stores, one per generation.
pub trait CacheStorage: Send + Sync + 'static {
  type Store: CacheStore;

  /// Open the store with the given name, creating it if absent.
  fn open(&self, name: &str) -> Result<Self::Store>;

  /// The store with the given name, if it exists. Never creates one.
  fn find(&self, name: &str) -> Result<Option<Self::Store>>;

  /// Names of every existing store.
  fn names(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;
}

/// A single named store mapping request identities to responses.
///
/// Implementations must make each `get`/`put` atomic per key; concurrent
/// writes to the same key resolve as last-write-wins.
pub trait CacheStore: Clone + Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Exact-identity lookup.
  fn get(&self, key: &RequestKey) -> Result<Option<Response>>;

  /// Insert or replace one entry.
  fn put(&self, key: &RequestKey, response: &Response) -> Result<()>;

  /// Insert or replace all entries, or none of them.
  fn put_all(&self, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Every key currently stored, with the time it was written.
  fn keys(&self) -> Result<Vec<CachedKey>>;
}

/// A key listed from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
  pub key: RequestKey,
  pub cached_at: DateTime<Utc>,
}
