//! Core request/response model shared by the store, the strategies and the
//! lifecycle controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
    }
  }
}

/// How the page issued the request.
///
/// `Navigation` is a full-document load; everything else (scripts, styles,
/// XHR/fetch calls) is a subresource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  Navigation,
  Subresource,
}

/// An outgoing resource request intercepted from a page.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
  pub method: Method,
  pub url: String,
  pub mode: RequestMode,
}

impl ResourceRequest {
  /// A plain GET subresource request.
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      mode: RequestMode::Subresource,
    }
  }

  /// A GET full-document load.
  pub fn navigation(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      mode: RequestMode::Navigation,
    }
  }

  /// Stable identity of this request for cache keying: SHA-256 over
  /// method and absolute URL.
  pub fn identity(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as seen by the page: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl ResourceResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Structured 503 with a JSON error body, returned when a read-only api
  /// request has no cached data and the network is unreachable. The body
  /// lets the page distinguish "no data" from "transport failure".
  pub fn unavailable_json() -> Self {
    let body = serde_json::json!({
      "error": "service_unavailable",
      "detail": "network unreachable and no cached data",
    });
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: body.to_string().into_bytes(),
    }
  }

  /// Minimal synthetic 503, the floor when even the pre-cached offline
  /// fallback document is missing.
  pub fn unavailable_plain() -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Service unavailable".to_vec(),
    }
  }
}

/// A response stored in a cache partition, stamped with its retrieval time.
///
/// Entries are immutable once stored: a refresh replaces the whole entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
  /// Original request URL, kept for diagnostics.
  pub url: String,
  pub response: ResourceResponse,
  pub fetched_at: DateTime<Utc>,
}

impl CachedEntry {
  pub fn new(url: impl Into<String>, response: ResourceResponse) -> Self {
    Self {
      url: url.into(),
      response,
      fetched_at: Utc::now(),
    }
  }
}
