//! In-memory cache storage, used for ephemeral runs and tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::traits::{CacheStorage, CacheStore, CachedKey};
use crate::http::{RequestKey, Response};

type Entries = Arc<RwLock<HashMap<RequestKey, (Response, chrono::DateTime<Utc>)>>>;

/// Storage that keeps every store in process memory.
#[derive(Default, Clone)]
pub struct MemoryStorage {
  stores: Arc<RwLock<BTreeMap<String, Entries>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  type Store = MemoryCache;

  fn open(&self, name: &str) -> Result<MemoryCache> {
    let mut stores = self
      .stores
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entries = stores.entry(name.to_string()).or_default();

    Ok(MemoryCache {
      name: name.to_string(),
      entries: Arc::clone(entries),
    })
  }

  fn find(&self, name: &str) -> Result<Option<MemoryCache>> {
    let stores = self
      .stores
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(name).map(|entries| MemoryCache {
      name: name.to_string(),
      entries: Arc::clone(entries),
    }))
  }

  fn names(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.keys().cloned().collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut stores = self
      .stores
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.remove(name).is_some())
  }
}

/// Handle to one store inside a [`MemoryStorage`].
#[derive(Clone)]
pub struct MemoryCache {
  name: String,
  entries: Entries,
}

impl CacheStore for MemoryCache {
  fn name(&self) -> &str {
    &self.name
  }

  fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
    let entries = self
      .entries
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).map(|(response, _)| response.clone()))
  }

  fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
    self.put_all(std::slice::from_ref(&(key.clone(), response.clone())))
  }

  fn put_all(&self, new_entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut entries = self
      .entries
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Utc::now();
    for (key, response) in new_entries {
      entries.insert(key.clone(), (response.clone(), now));
    }
    Ok(())
  }

  fn keys(&self) -> Result<Vec<CachedKey>> {
    let entries = self
      .entries
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut keys: Vec<CachedKey> = entries
      .iter()
      .map(|(key, (_, cached_at))| CachedKey {
        key: key.clone(),
        cached_at: *cached_at,
      })
      .collect();
    keys.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Request;

  #[test]
  fn test_deleted_store_handle_is_detached() {
    let storage = MemoryStorage::new();
    let store = storage.open("v1").unwrap();
    let key = Request::parse("https://app.test/").unwrap().key();
    store.put(&key, &Response::new(200)).unwrap();

    assert!(storage.delete("v1").unwrap());

    let reopened = storage.open("v1").unwrap();
    assert!(reopened.get(&key).unwrap().is_none());
  }

  #[test]
  fn test_clones_share_entries() {
    let storage = MemoryStorage::new();
    let store = storage.open("v1").unwrap();
    let other = storage.open("v1").unwrap();
    let key = Request::parse("https://app.test/a").unwrap().key();

    store.put(&key, &Response::new(201)).unwrap();

    assert_eq!(other.get(&key).unwrap().map(|r| r.status), Some(201));
    assert_eq!(storage.names().unwrap(), vec!["v1".to_string()]);
  }

  #[test]
  fn test_find_does_not_create() {
    let storage = MemoryStorage::new();
    assert!(storage.find("v1").unwrap().is_none());
    assert!(storage.names().unwrap().is_empty());

    let key = Request::parse("https://app.test/").unwrap().key();
    storage.open("v1").unwrap().put(&key, &Response::new(200)).unwrap();

    let found = storage.find("v1").unwrap().unwrap();
    assert_eq!(found.get(&key).unwrap().map(|r| r.status), Some(200));
  }
}
