//! The offline caching and update-coordination engine.
//!
//! Every intercepted request is classified, dispatched to the strategy for
//! its class against the right partition, and always answered with
//! something. The lifecycle controller drives install, activation-time
//! partition garbage collection and supersession; the update coordinator
//! runs orthogonally, exchanging control messages with connected pages.

mod classify;
mod coordinator;
mod lifecycle;
mod strategy;

pub use classify::{Classifier, RequestClass};
pub use coordinator::{PageHandle, PageMessage, UpdateCoordinator, WorkerMessage};
pub use lifecycle::{Engine, LifecycleState};
pub use strategy::StrategyEngine;
