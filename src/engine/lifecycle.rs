//! Lifecycle controller: drives install (pre-warm), activate (partition
//! garbage collection) and the interception loop, and owns the engine's
//! single lifecycle state variable.

use std::sync::{Arc, Mutex, MutexGuard};

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{info, warn};

use super::classify::{Classifier, RequestClass};
use super::coordinator::{PageMessage, UpdateCoordinator, WorkerMessage};
use super::strategy::StrategyEngine;
use crate::config::{Config, PartitionSet};
use crate::fetch::Fetcher;
use crate::resource::{CachedEntry, ResourceRequest, ResourceResponse};
use crate::store::PartitionStore;

/// The engine instance's lifecycle.
///
/// `Waiting` doubles as the installed-but-not-yet-active update state the
/// coordinator advertises to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Activating,
  Active,
  Superseded,
}

/// One engine version: classifier, strategies, partition set and the
/// update coordinator, behind a single state machine.
pub struct Engine {
  version: String,
  partitions: PartitionSet,
  classifier: Classifier,
  strategies: StrategyEngine,
  store: Arc<dyn PartitionStore>,
  fetcher: Arc<dyn Fetcher>,
  coordinator: Arc<UpdateCoordinator>,
  /// Documents pre-warmed into the app-shell partition
  shell_urls: Vec<String>,
  /// Assets (offline fallback included) pre-warmed into the static partition
  asset_urls: Vec<String>,
  state: Mutex<LifecycleState>,
}

impl Engine {
  pub fn new(
    config: &Config,
    store: Arc<dyn PartitionStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    let partitions = config.partition_set();
    let classifier = Classifier::new(&config.routes);
    let fallback_url = config.resolve(&config.offline_fallback)?;

    let strategies = StrategyEngine::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      partitions.clone(),
      config.api_ttl(),
      fallback_url.clone(),
    );

    let shell_urls = config
      .precache
      .shell
      .iter()
      .map(|path| config.resolve(path))
      .collect::<Result<Vec<_>>>()?;
    let mut asset_urls = config
      .precache
      .assets
      .iter()
      .map(|path| config.resolve(path))
      .collect::<Result<Vec<_>>>()?;

    // The offline fallback must survive offline even when the build's
    // manifest forgets it
    if !asset_urls.contains(&fallback_url) && !shell_urls.contains(&fallback_url) {
      asset_urls.push(fallback_url);
    }

    Ok(Self {
      version: config.version.clone(),
      partitions,
      classifier,
      strategies,
      store,
      fetcher,
      coordinator: Arc::new(UpdateCoordinator::new()),
      shell_urls,
      asset_urls,
      state: Mutex::new(LifecycleState::Installing),
    })
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn state(&self) -> LifecycleState {
    *self.state_guard()
  }

  pub fn coordinator(&self) -> Arc<UpdateCoordinator> {
    Arc::clone(&self.coordinator)
  }

  /// Pre-warm the app-shell and static partitions from the install
  /// manifest.
  ///
  /// The whole step is atomic: every URL is fetched (concurrently) before
  /// anything is stored, and one bad fetch fails the install, so a partial
  /// pre-warm never reaches `Waiting`. On success the instance enters
  /// `Waiting` and pages are told an update is available, exactly once for
  /// this version.
  pub async fn install(&self) -> Result<()> {
    info!(
      "installing {}: pre-warming {} urls",
      self.version,
      self.shell_urls.len() + self.asset_urls.len()
    );

    let shell = self.fetch_manifest(&self.shell_urls).await?;
    let assets = self.fetch_manifest(&self.asset_urls).await?;

    for (request, response) in shell {
      self.store.put(
        &self.partitions.app_shell(),
        &request.identity(),
        &CachedEntry::new(&request.url, response),
      )?;
    }
    for (request, response) in assets {
      self.store.put(
        &self.partitions.static_assets(),
        &request.identity(),
        &CachedEntry::new(&request.url, response),
      )?;
    }

    *self.state_guard() = LifecycleState::Waiting;
    self.coordinator.broadcast(WorkerMessage::UpdateAvailable {
      version: self.version.clone(),
    });
    info!("installed {}; waiting to activate", self.version);

    Ok(())
  }

  async fn fetch_manifest(
    &self,
    urls: &[String],
  ) -> Result<Vec<(ResourceRequest, ResourceResponse)>> {
    let fetches = urls.iter().map(|url| {
      let request = ResourceRequest::get(url.clone());
      let fetcher = Arc::clone(&self.fetcher);

      async move {
        let response = fetcher.fetch(&request).await?;
        if !response.is_success() {
          return Err(eyre!(
            "precache fetch of {} returned {}",
            request.url,
            response.status
          ));
        }
        Ok((request, response))
      }
    });

    try_join_all(fetches).await
  }

  /// Garbage-collect partitions from other versions, then start
  /// intercepting.
  ///
  /// Idempotent: an already-active instance returns immediately, so the
  /// current version's own partitions are never collected twice. GC runs
  /// strictly before any request is served by this instance; that temporal
  /// separation is the engine's consistency discipline.
  pub async fn activate(&self) -> Result<()> {
    {
      let mut state = self.state_guard();
      match *state {
        LifecycleState::Active => return Ok(()),
        LifecycleState::Superseded => {
          return Err(eyre!("cannot activate a superseded instance"))
        }
        _ => *state = LifecycleState::Activating,
      }
    }

    let expected = self.partitions.expected();
    match self.store.partitions() {
      Ok(names) => {
        for name in names {
          if !expected.contains(&name) {
            info!("dropping partition {} from another version", name);
            if let Err(e) = self.store.drop_partition(&name) {
              // Retried implicitly on the next activation
              warn!("failed to drop partition {}: {}", name, e);
            }
          }
        }
      }
      Err(e) => warn!("partition enumeration failed, skipping gc: {}", e),
    }

    *self.state_guard() = LifecycleState::Active;
    self.coordinator.broadcast(WorkerMessage::Updated);
    info!("{} active", self.version);

    Ok(())
  }

  /// Answer one intercepted request.
  ///
  /// A non-active instance does not intercept: the request goes straight
  /// to the network with no cache side effects. Excluded requests do the
  /// same even when active.
  pub async fn handle(&self, request: &ResourceRequest) -> Result<ResourceResponse> {
    if self.state() != LifecycleState::Active {
      return self.fetcher.fetch(request).await;
    }

    match self.classifier.classify(request) {
      RequestClass::Excluded => self.fetcher.fetch(request).await,
      RequestClass::StaticAsset => self.strategies.cache_first(request).await,
      RequestClass::ReadOnlyApi => self.strategies.stale_while_revalidate(request).await,
      RequestClass::Navigation | RequestClass::Other => {
        self.strategies.network_first(request).await
      }
    }
  }

  /// A later version finished activating; stop intercepting new requests.
  /// Requests already started are left to complete.
  pub fn supersede(&self) {
    *self.state_guard() = LifecycleState::Superseded;
    info!("{} superseded", self.version);
  }

  /// Handle one inbound coordinator message from a page.
  pub async fn on_page_message(&self, message: PageMessage) -> Result<()> {
    match message {
      PageMessage::SkipWaiting => self.activate().await,
      PageMessage::GetVersion { reply } => {
        // Diagnostics only; a closed page just drops the reply
        let _ = reply.send(self.version.clone());
        Ok(())
      }
    }
  }

  fn state_guard(&self) -> MutexGuard<'_, LifecycleState> {
    self
      .state
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
  }
}
