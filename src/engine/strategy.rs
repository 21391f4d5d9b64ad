//! Strategy engine: the read/write/network policy applied to each request
//! classification.
//!
//! All three strategies share one degradation rule: a partition failure is
//! logged and treated as a cache miss, and the chain bottoms out at a
//! synthetic 503 rather than an unhandled error.

use std::sync::Arc;

use chrono::{Duration, Utc};
use color_eyre::Result;
use tracing::{debug, warn};

use crate::config::PartitionSet;
use crate::fetch::Fetcher;
use crate::resource::{CachedEntry, ResourceRequest, ResourceResponse};
use crate::store::PartitionStore;

pub struct StrategyEngine {
  store: Arc<dyn PartitionStore>,
  fetcher: Arc<dyn Fetcher>,
  partitions: PartitionSet,
  /// How long an api entry stays fresh
  api_ttl: Duration,
  /// Absolute URL of the pre-cached offline fallback document
  fallback_url: String,
}

impl StrategyEngine {
  pub fn new(
    store: Arc<dyn PartitionStore>,
    fetcher: Arc<dyn Fetcher>,
    partitions: PartitionSet,
    api_ttl: Duration,
    fallback_url: String,
  ) -> Self {
    Self {
      store,
      fetcher,
      partitions,
      api_ttl,
      fallback_url,
    }
  }

  /// Cache-first, for static assets.
  ///
  /// A cached entry is returned with no freshness check and no network
  /// round-trip; assets are content-addressed or version-qualified by the
  /// caller. On a miss the network response is stored (2xx only) before
  /// being returned; transport errors propagate.
  pub async fn cache_first(&self, request: &ResourceRequest) -> Result<ResourceResponse> {
    let partition = self.partitions.static_assets();

    if let Some(entry) = self.lookup(&partition, &request.identity()) {
      return Ok(entry.response);
    }

    let response = self.fetcher.fetch(request).await?;
    if response.is_success() {
      self.store_response(&partition, request, &response);
    }
    Ok(response)
  }

  /// Stale-while-revalidate, for read-only api endpoints.
  ///
  /// A cached entry is always returned immediately; if it has outlived the
  /// TTL a detached refresh is spawned for future requests. Without a
  /// cached entry the caller waits on the network, and a transport failure
  /// becomes a structured 503 so the page can tell "no data" from
  /// "transport failure".
  pub async fn stale_while_revalidate(
    &self,
    request: &ResourceRequest,
  ) -> Result<ResourceResponse> {
    let partition = self.partitions.api();

    if let Some(entry) = self.lookup(&partition, &request.identity()) {
      if self.is_stale(&entry) {
        self.spawn_revalidate(request.clone());
      }
      return Ok(entry.response);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_response(&partition, request, &response);
        }
        Ok(response)
      }
      Err(e) => {
        debug!("api fetch of {} failed with no cached data: {}", request.url, e);
        Ok(ResourceResponse::unavailable_json())
      }
    }
  }

  /// Network-first with fallback, for navigations and uncategorized
  /// requests.
  ///
  /// Successful responses are returned as-is and never stored; serving a
  /// stale full-page document is worse than a round-trip. On transport
  /// failure: exact match anywhere in the store, then the offline fallback
  /// document, then a minimal synthetic 503.
  pub async fn network_first(&self, request: &ResourceRequest) -> Result<ResourceResponse> {
    match self.fetcher.fetch(request).await {
      Ok(response) => return Ok(response),
      Err(e) => debug!("network fetch of {} failed, falling back: {}", request.url, e),
    }

    match self.store.match_any(&request.identity()) {
      Ok(Some(entry)) => return Ok(entry.response),
      Ok(None) => {}
      Err(e) => warn!("fallback lookup failed: {}", e),
    }

    let fallback = ResourceRequest::get(&self.fallback_url);
    if let Some(entry) = self.lookup(&self.partitions.static_assets(), &fallback.identity()) {
      return Ok(entry.response);
    }

    // Missing fallback document is a configuration error; still answer
    warn!("offline fallback document missing from static partition");
    Ok(ResourceResponse::unavailable_plain())
  }

  fn is_stale(&self, entry: &CachedEntry) -> bool {
    Utc::now() - entry.fetched_at > self.api_ttl
  }

  /// Partition read that degrades to a miss on storage failure.
  fn lookup(&self, partition: &str, identity: &str) -> Option<CachedEntry> {
    match self.store.get(partition, identity) {
      Ok(found) => found,
      Err(e) => {
        warn!("partition read failed ({}): {}", partition, e);
        None
      }
    }
  }

  /// Partition write that logs and swallows storage failure; the request
  /// still completes with the fetched response.
  fn store_response(
    &self,
    partition: &str,
    request: &ResourceRequest,
    response: &ResourceResponse,
  ) {
    let entry = CachedEntry::new(&request.url, response.clone());
    if let Err(e) = self.store.put(partition, &request.identity(), &entry) {
      warn!("partition write failed ({}): {}", partition, e);
    }
  }

  /// Refresh an api entry in the background. The caller never awaits the
  /// outcome; every failure is logged and swallowed at this boundary.
  fn spawn_revalidate(&self, request: ResourceRequest) {
    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);
    let partition = self.partitions.api();

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) if response.is_success() => {
          let entry = CachedEntry::new(&request.url, response);
          if let Err(e) = store.put(&partition, &request.identity(), &entry) {
            warn!("background refresh write failed for {}: {}", request.url, e);
          }
        }
        Ok(response) => {
          debug!(
            "background refresh of {} returned {}",
            request.url, response.status
          );
        }
        Err(e) => {
          debug!("background refresh of {} failed: {}", request.url, e);
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::testing::{ok_response, FakeFetcher};
  use crate::store::MemoryStore;
  use std::time::Duration as StdDuration;

  const FALLBACK_URL: &str = "http://pos.local/offline/";

  fn engine(fetcher: Arc<FakeFetcher>) -> (StrategyEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let strategies = StrategyEngine::new(
      store.clone(),
      fetcher,
      PartitionSet::new("v1"),
      Duration::hours(1),
      FALLBACK_URL.to_string(),
    );
    (strategies, store)
  }

  fn stale_entry(url: &str, body: &[u8]) -> CachedEntry {
    let mut entry = CachedEntry::new(url, ok_response(body));
    entry.fetched_at = Utc::now() - Duration::hours(2);
    entry
  }

  async fn settle() {
    tokio::time::sleep(StdDuration::from_millis(20)).await;
  }

  #[tokio::test]
  async fn test_cache_first_hit_skips_network() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/static/css/pos.css");

    store
      .put(
        "static-v1",
        &request.identity(),
        &CachedEntry::new(&request.url, ok_response(b"cached")),
      )
      .unwrap();

    let response = strategies.cache_first(&request).await.unwrap();
    assert_eq!(response.body, b"cached");
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test]
  async fn test_cache_first_stores_on_miss() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, _store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/static/js/register.js");
    fetcher.respond_ok(&request.url, b"console.log(1)");

    let first = strategies.cache_first(&request).await.unwrap();
    assert_eq!(first.body, b"console.log(1)");
    assert_eq!(fetcher.calls(), 1);

    // Second identical request is answered from the partition
    let second = strategies.cache_first(&request).await.unwrap();
    assert_eq!(second.body, b"console.log(1)");
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_error_responses() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/static/js/missing.js");

    let response = strategies.cache_first(&request).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(store.entry_count("static-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_cache_first_propagates_transport_error_on_miss() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.set_offline(true);
    let (strategies, _store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/static/css/pos.css");

    assert!(strategies.cache_first(&request).await.is_err());
  }

  #[tokio::test]
  async fn test_swr_fresh_entry_skips_network() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/payments/api/recent/");

    store
      .put(
        "api-v1",
        &request.identity(),
        &CachedEntry::new(&request.url, ok_response(b"[1,2,3]")),
      )
      .unwrap();

    let response = strategies.stale_while_revalidate(&request).await.unwrap();
    assert_eq!(response.body, b"[1,2,3]");

    settle().await;
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test]
  async fn test_swr_stale_entry_returns_immediately_and_revalidates_once() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/payments/api/recent/");

    store
      .put("api-v1", &request.identity(), &stale_entry(&request.url, b"old"))
      .unwrap();
    fetcher.respond_ok(&request.url, b"new");

    // The caller sees the stale body with no waiting
    let response = strategies.stale_while_revalidate(&request).await.unwrap();
    assert_eq!(response.body, b"old");

    // Exactly one background refresh lands the new body
    settle().await;
    assert_eq!(fetcher.calls(), 1);
    let refreshed = store.get("api-v1", &request.identity()).unwrap().unwrap();
    assert_eq!(refreshed.response.body, b"new");
  }

  #[tokio::test]
  async fn test_swr_background_failure_is_swallowed() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/payments/api/recent/");

    store
      .put("api-v1", &request.identity(), &stale_entry(&request.url, b"old"))
      .unwrap();
    fetcher.set_offline(true);

    let response = strategies.stale_while_revalidate(&request).await.unwrap();
    assert_eq!(response.body, b"old");

    settle().await;
    let kept = store.get("api-v1", &request.identity()).unwrap().unwrap();
    assert_eq!(kept.response.body, b"old");
  }

  #[tokio::test]
  async fn test_swr_miss_fetches_and_stores() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/register/product_lookup/");
    fetcher.respond_ok(&request.url, b"{\"sku\":\"123\"}");

    let response = strategies.stale_while_revalidate(&request).await.unwrap();
    assert_eq!(response.body, b"{\"sku\":\"123\"}");
    assert_eq!(store.entry_count("api-v1").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_swr_miss_offline_returns_structured_503() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.set_offline(true);
    let (strategies, _store) = engine(fetcher.clone());
    let request = ResourceRequest::get("http://pos.local/payments/api/recent/");

    let response = strategies.stale_while_revalidate(&request).await.unwrap();
    assert_eq!(response.status, 503);

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "service_unavailable");
  }

  #[tokio::test]
  async fn test_network_first_success_is_never_stored() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::navigation("http://pos.local/dashboard_sales/");
    fetcher.respond_ok(&request.url, b"<html>dashboard</html>");

    let response = strategies.network_first(&request).await.unwrap();
    assert_eq!(response.body, b"<html>dashboard</html>");

    for partition in ["app-shell-v1", "static-v1", "api-v1"] {
      assert_eq!(store.entry_count(partition).unwrap(), 0);
    }
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_exact_match() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let request = ResourceRequest::navigation("http://pos.local/register/");

    // Pre-warmed at install time into the app shell
    store
      .put(
        "app-shell-v1",
        &request.identity(),
        &CachedEntry::new(&request.url, ok_response(b"<html>register</html>")),
      )
      .unwrap();
    fetcher.set_offline(true);

    let response = strategies.network_first(&request).await.unwrap();
    assert_eq!(response.body, b"<html>register</html>");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_offline_document() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (strategies, store) = engine(fetcher.clone());
    let fallback = ResourceRequest::get(FALLBACK_URL);

    store
      .put(
        "static-v1",
        &fallback.identity(),
        &CachedEntry::new(FALLBACK_URL, ok_response(b"<html>offline</html>")),
      )
      .unwrap();
    fetcher.set_offline(true);

    let request = ResourceRequest::navigation("http://pos.local/transaction/998/");
    let response = strategies.network_first(&request).await.unwrap();
    assert_eq!(response.body, b"<html>offline</html>");
  }

  #[tokio::test]
  async fn test_network_first_synthesizes_503_without_fallback() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.set_offline(true);
    let (strategies, _store) = engine(fetcher.clone());

    let request = ResourceRequest::navigation("http://pos.local/transaction/");
    let response = strategies.network_first(&request).await.unwrap();
    assert_eq!(response.status, 503);
  }
}
