//! Named, generation-scoped response stores.
//!
//! Each generation owns one store mapping a request identity (method + URL)
//! to a stored response. Stores are created lazily on open, enumerated by
//! name and deleted wholesale when a generation is superseded.

mod memory;
mod storage;
mod traits;

pub use memory::{MemoryCache, MemoryStorage};
pub use storage::{SqliteCache, SqliteStorage};
pub use traits::{CacheStorage, CacheStore, CachedKey};
