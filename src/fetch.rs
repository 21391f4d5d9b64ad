//! Network fetch seam between the engine and the outside world.
//!
//! Strategies and the lifecycle controller only ever talk to the `Fetcher`
//! trait; the real implementation rides on reqwest. Tests substitute the
//! fake in [`testing`].

use std::future::Future;
use std::pin::Pin;

use color_eyre::{eyre::eyre, Result};

use crate::resource::{Method, ResourceRequest, ResourceResponse};

/// A boxed future resolving to a fetched response.
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<ResourceResponse>> + Send>>;

/// Live network fetch primitive.
///
/// An `Err` means transport failure (DNS, connect, read). A reachable
/// origin answering with a non-success status is still an `Ok`.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &ResourceRequest) -> FetchFuture;
}

/// `Fetcher` backed by a shared reqwest client.
///
/// No engine-internal timeout is configured; the surrounding network
/// layer's own limits apply.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
    Method::Options => reqwest::Method::OPTIONS,
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &ResourceRequest) -> FetchFuture {
    let client = self.client.clone();
    let request = request.clone();

    Box::pin(async move {
      let response = client
        .request(to_reqwest_method(request.method), &request.url)
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
          (
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
          )
        })
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
        .to_vec();

      Ok(ResourceResponse {
        status,
        headers,
        body,
      })
    })
  }
}

#[cfg(test)]
pub mod testing {
  //! Test doubles shared by the strategy and lifecycle tests.

  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  use color_eyre::eyre::eyre;

  use super::{FetchFuture, Fetcher};
  use crate::resource::{ResourceRequest, ResourceResponse};

  /// 200 response with an HTML body.
  pub fn ok_response(body: &[u8]) -> ResourceResponse {
    ResourceResponse {
      status: 200,
      headers: vec![("content-type".to_string(), "text/html".to_string())],
      body: body.to_vec(),
    }
  }

  /// Canned fetcher: responds from a URL table, counts every attempt, and
  /// can be flipped offline to simulate transport failure.
  pub struct FakeFetcher {
    responses: Mutex<HashMap<String, ResourceResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
  }

  impl FakeFetcher {
    pub fn new() -> Self {
      Self {
        responses: Mutex::new(HashMap::new()),
        offline: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
      }
    }

    pub fn respond(&self, url: &str, response: ResourceResponse) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn respond_ok(&self, url: &str, body: &[u8]) {
      self.respond(url, ok_response(body));
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetch attempts, including ones made while offline.
    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Fetcher for FakeFetcher {
    fn fetch(&self, request: &ResourceRequest) -> FetchFuture {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let offline = self.offline.load(Ordering::SeqCst);
      let response = self.responses.lock().unwrap().get(&request.url).cloned();
      let url = request.url.clone();

      Box::pin(async move {
        if offline {
          return Err(eyre!("connection refused: {}", url));
        }
        Ok(response.unwrap_or(ResourceResponse {
          status: 404,
          headers: Vec::new(),
          body: Vec::new(),
        }))
      })
    }
  }
}
