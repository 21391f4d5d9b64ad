//! Offline resource cache and update coordinator for the retail POS web
//! client.
//!
//! The engine runs alongside the client application, independent of any
//! single page: it intercepts outgoing resource requests, serves them from
//! versioned cache partitions under a per-category strategy, garbage
//! collects partitions across deployments, and negotiates activation of a
//! newly installed version with every connected page.

pub mod config;
pub mod engine;
pub mod fetch;
pub mod resource;
pub mod store;
