//! Request and response types shared by the router, the stores and the network.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Whether credentials (cookies, authorization) accompany a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
  /// Never send credentials
  Omit,
  /// Send credentials only to the worker's own origin
  #[default]
  SameOrigin,
  /// Always send credentials
  Include,
}

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub credentials: Credentials,
}

impl Request {
  /// A plain GET for an absolute URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      credentials: Credentials::default(),
    }
  }

  /// Parse an absolute URL and build a GET for it.
  pub fn parse(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL {}: {}", url, e))?;
    Ok(Self::get(url))
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_credentials(mut self, credentials: Credentials) -> Self {
    self.credentials = credentials;
    self
  }

  /// Identity used to address this request in a cache store.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }

  /// Whether credentials may be attached when sending to the given origin.
  pub fn sends_credentials_to(&self, own_origin: &url::Origin) -> bool {
    match self.credentials {
      Credentials::Omit => false,
      Credentials::SameOrigin => self.url.origin() == *own_origin,
      Credentials::Include => true,
    }
  }
}

/// A response, either live from the network or stored in a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// True for 2xx statuses.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Cache key for a request: method plus absolute URL.
///
/// Fragments never reach a server, so they are dropped from the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
    }
  }

  /// Rebuild a key from its stored parts.
  pub fn from_parts(method: &str, url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid cached URL {}: {}", url, e))?;
    Ok(Self::new(method, &url))
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length hash used as the storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_ignores_fragment() {
    let a = Request::parse("https://app.test/page#top").unwrap();
    let b = Request::parse("https://app.test/page").unwrap();
    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().cache_hash(), b.key().cache_hash());
  }

  #[test]
  fn test_key_distinguishes_method() {
    let get = Request::parse("https://app.test/api").unwrap();
    let post = get.clone().with_method("post");
    assert_ne!(get.key(), post.key());
    assert_eq!(post.key().method(), "POST");
  }

  #[test]
  fn test_key_keeps_query_string() {
    let a = Request::parse("https://app.test/a?x=1").unwrap();
    let b = Request::parse("https://app.test/a?x=2").unwrap();
    assert_ne!(a.key(), b.key());
  }

  #[test]
  fn test_credentials_same_origin_only() {
    let origin = Url::parse("https://app.test").unwrap().origin();
    let own = Request::parse("https://app.test/x").unwrap();
    let foreign = Request::parse("https://fonts.test/css").unwrap();
    assert!(own.sends_credentials_to(&origin));
    assert!(!foreign.sends_credentials_to(&origin));
    assert!(!own
      .with_credentials(Credentials::Omit)
      .sends_credentials_to(&origin));
  }

  #[test]
  fn test_response_status_classes() {
    assert!(Response::new(200).is_ok());
    assert!(Response::new(204).is_ok());
    assert!(!Response::new(304).is_ok());
    assert!(!Response::new(404).is_ok());
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let response = Response::new(200).with_header("Content-Type", "text/html");
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.header("etag"), None);
  }
}
