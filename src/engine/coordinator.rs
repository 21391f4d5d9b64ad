//! Update coordinator: worker↔pages messaging.
//!
//! A simple publish/subscribe registry keyed by connected-page identity.
//! Delivery is at-least-once per connected page with no ordering guarantee
//! across distinct pages; a page that disconnects before a broadcast simply
//! misses it (no retry, no queue). Correctness never depends on a page
//! receiving a notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

/// Notifications pushed from the engine to connected pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
  /// A new version finished installing and is waiting to activate
  UpdateAvailable { version: String },
  /// A new version finished activating; pages may prompt a reload
  Updated,
}

/// Commands sent from a page to the engine.
#[derive(Debug)]
pub enum PageMessage {
  /// Activate the waiting version immediately
  SkipWaiting,
  /// Diagnostics query; answered with the version identifier
  GetVersion { reply: oneshot::Sender<String> },
}

/// Registry of connected pages.
pub struct UpdateCoordinator {
  next_id: AtomicU64,
  pages: Mutex<HashMap<u64, mpsc::UnboundedSender<WorkerMessage>>>,
}

impl UpdateCoordinator {
  pub fn new() -> Self {
    Self {
      next_id: AtomicU64::new(0),
      pages: Mutex::new(HashMap::new()),
    }
  }

  /// Register a page and hand back its end of the channel.
  pub fn connect(&self) -> PageHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    self
      .pages
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(id, tx);
    PageHandle { id, rx }
  }

  pub fn disconnect(&self, id: u64) {
    self
      .pages
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(&id);
  }

  /// Deliver to every currently connected page. Pages whose receiver is
  /// gone are dropped from the registry, not retried.
  pub fn broadcast(&self, message: WorkerMessage) {
    let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
    pages.retain(|_, tx| tx.send(message.clone()).is_ok());
  }

  pub fn connected(&self) -> usize {
    self.pages.lock().unwrap_or_else(|e| e.into_inner()).len()
  }
}

impl Default for UpdateCoordinator {
  fn default() -> Self {
    Self::new()
  }
}

/// A page's end of the coordinator channel.
pub struct PageHandle {
  pub id: u64,
  rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl PageHandle {
  /// Receive the next notification.
  pub async fn next(&mut self) -> Option<WorkerMessage> {
    self.rx.recv().await
  }

  /// Non-blocking receive; `None` when nothing is queued.
  pub fn try_next(&mut self) -> Option<WorkerMessage> {
    self.rx.try_recv().ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_broadcast_reaches_every_connected_page() {
    let coordinator = UpdateCoordinator::new();
    let mut first = coordinator.connect();
    let mut second = coordinator.connect();

    coordinator.broadcast(WorkerMessage::Updated);

    assert_eq!(first.next().await, Some(WorkerMessage::Updated));
    assert_eq!(second.next().await, Some(WorkerMessage::Updated));
  }

  #[tokio::test]
  async fn test_disconnected_page_misses_broadcasts() {
    let coordinator = UpdateCoordinator::new();
    let gone = coordinator.connect();
    let mut stays = coordinator.connect();

    coordinator.disconnect(gone.id);
    coordinator.broadcast(WorkerMessage::UpdateAvailable {
      version: "v2".to_string(),
    });

    assert_eq!(coordinator.connected(), 1);
    assert_eq!(
      stays.next().await,
      Some(WorkerMessage::UpdateAvailable {
        version: "v2".to_string()
      })
    );
  }

  #[tokio::test]
  async fn test_dropped_receiver_is_pruned_on_broadcast() {
    let coordinator = UpdateCoordinator::new();
    let dropped = coordinator.connect();
    let _kept = coordinator.connect();
    drop(dropped);

    coordinator.broadcast(WorkerMessage::Updated);
    assert_eq!(coordinator.connected(), 1);
  }

  #[tokio::test]
  async fn test_try_next_is_non_blocking() {
    let coordinator = UpdateCoordinator::new();
    let mut page = coordinator.connect();

    assert_eq!(page.try_next(), None);
    coordinator.broadcast(WorkerMessage::Updated);
    assert_eq!(page.try_next(), Some(WorkerMessage::Updated));
    assert_eq!(page.try_next(), None);
  }
}
