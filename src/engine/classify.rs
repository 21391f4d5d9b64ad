//! Request classification: maps an intercepted request to the strategy
//! that will answer it.

use url::Url;

use crate::config::RouteConfig;
use crate::resource::{Method, RequestMode, ResourceRequest};

/// One classification per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Content-addressed or version-qualified asset; cache-first
  StaticAsset,
  /// Idempotent JSON endpoint; stale-while-revalidate
  ReadOnlyApi,
  /// Full-document load; network-first with offline fallback
  Navigation,
  /// Authenticated or mutating surface; bypasses the engine entirely
  Excluded,
  /// Pass-through, nothing stored
  Other,
}

/// Pure classifier over the configured path lists.
pub struct Classifier {
  exclude: Vec<String>,
  api: Vec<String>,
  static_prefixes: Vec<String>,
  static_extensions: Vec<String>,
}

impl Classifier {
  pub fn new(routes: &RouteConfig) -> Self {
    Self {
      exclude: routes.exclude.clone(),
      api: routes.api.clone(),
      static_prefixes: routes.static_prefixes.clone(),
      static_extensions: routes
        .static_extensions
        .iter()
        .map(|e| e.to_lowercase())
        .collect(),
    }
  }

  pub fn classify(&self, request: &ResourceRequest) -> RequestClass {
    // Mutating methods never touch the cache
    if request.method != Method::Get {
      return RequestClass::Excluded;
    }

    let path = match Url::parse(&request.url) {
      Ok(url) => url.path().to_string(),
      Err(_) => return RequestClass::Other,
    };

    if self.matches_prefix(&self.exclude, &path) {
      return RequestClass::Excluded;
    }

    // Checked before api so that static wins ties
    if self.is_static(&path) {
      return RequestClass::StaticAsset;
    }

    if self.matches_prefix(&self.api, &path) {
      return RequestClass::ReadOnlyApi;
    }

    if request.mode == RequestMode::Navigation {
      return RequestClass::Navigation;
    }

    RequestClass::Other
  }

  fn matches_prefix(&self, prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
  }

  fn is_static(&self, path: &str) -> bool {
    if self.matches_prefix(&self.static_prefixes, path) {
      return true;
    }

    match path.rsplit_once('.') {
      Some((_, extension)) => self
        .static_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension)),
      None => false,
    }
  }
}
