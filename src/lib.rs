//! Offline-first request intermediary.
//!
//! Intercepted requests are answered from a generation-versioned cache or
//! the network: same-origin requests cache-first with write-through,
//! cross-origin requests network-first with the cache as fallback. Each
//! deploy installs its asset manifest into a fresh generation and evicts
//! every older one on activation.

pub mod cache;
pub mod config;
pub mod event;
pub mod generation;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod router;
pub mod worker;

#[cfg(test)]
mod testing;
