//! In-memory partition store.

use std::collections::HashMap;
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};

use super::traits::PartitionStore;
use crate::resource::CachedEntry;

/// Non-durable store backed by nested hash maps.
/// Used in tests and for ephemeral runs where persistence is unwanted.
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      partitions: Mutex::new(HashMap::new()),
    }
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl PartitionStore for MemoryStore {
  fn get(&self, partition: &str, identity: &str) -> Result<Option<CachedEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      partitions
        .get(partition)
        .and_then(|entries| entries.get(identity))
        .cloned(),
    )
  }

  fn put(&self, partition: &str, identity: &str, entry: &CachedEntry) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    partitions
      .entry(partition.to_string())
      .or_default()
      .insert(identity.to_string(), entry.clone());

    Ok(())
  }

  fn match_any(&self, identity: &str) -> Result<Option<CachedEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Stable order so repeated lookups agree
    let mut names: Vec<&String> = partitions.keys().collect();
    names.sort();

    for name in names {
      if let Some(entry) = partitions[name].get(identity) {
        return Ok(Some(entry.clone()));
      }
    }

    Ok(None)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = partitions.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn drop_partition(&self, partition: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    partitions.remove(partition);
    Ok(())
  }

  fn entry_count(&self, partition: &str) -> Result<u64> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      partitions
        .get(partition)
        .map(|entries| entries.len() as u64)
        .unwrap_or(0),
    )
  }
}
