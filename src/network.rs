//! Outbound network access.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;
use url::{Origin, Url};

use crate::http::{Request, Response};

/// Headers that carry credentials and are stripped when credentials are not sent.
const CREDENTIAL_HEADERS: &[&str] = &["cookie", "authorization", "proxy-authorization"];

/// Something that can perform a request against the network.
///
/// An `Err` means the fetch itself failed (unreachable host, connection
/// reset); HTTP error statuses are returned as ordinary responses.
pub trait Network: Send + Sync {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}

/// Network client backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpNetwork {
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offline-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.origin(),
    })
  }

  async fn send(&self, request: &Request) -> Result<Response> {
    let method = request_method(request)?;
    let with_credentials = request.sends_credentials_to(&self.origin);

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      if !with_credentials && CREDENTIAL_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        continue;
      }
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| eyre!("Invalid header name {}: {}", name, e))?;
      let value =
        HeaderValue::from_str(value).map_err(|e| eyre!("Invalid header value: {}", e))?;
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    debug!(url = %request.url, status, bytes = body.len(), "network response");

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

/// HTTP method of `request`. Method names are case-sensitive on the wire, so
/// standard methods are normalized to upper case.
fn request_method(request: &Request) -> Result<reqwest::Method> {
  reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))
}

impl Network for HttpNetwork {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(self.send(request))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_method_is_normalized() {
    let request = Request {
      method: "get".to_string(),
      ..Request::parse("https://app.test/").unwrap()
    };
    assert_eq!(request_method(&request).unwrap(), reqwest::Method::GET);

    let request = Request {
      method: "Post".to_string(),
      ..request
    };
    assert_eq!(request_method(&request).unwrap(), reqwest::Method::POST);
  }

  #[test]
  fn test_invalid_method_is_rejected() {
    let request = Request {
      method: "GE T".to_string(),
      ..Request::parse("https://app.test/").unwrap()
    };
    assert!(request_method(&request).is_err());
  }
}
