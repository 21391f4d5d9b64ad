//! Cache partition store trait.

use color_eyre::Result;

use crate::resource::CachedEntry;

/// Durable, named key→response mappings; the engine's only state.
///
/// Partitions are disjoint by name. Only GET responses are ever stored,
/// and an entry is replaced wholesale, never patched. Deleting a whole
/// partition is the only eviction mechanism.
pub trait PartitionStore: Send + Sync {
  /// Look up an entry by request identity within one partition.
  fn get(&self, partition: &str, identity: &str) -> Result<Option<CachedEntry>>;

  /// Store or replace an entry.
  fn put(&self, partition: &str, identity: &str, entry: &CachedEntry) -> Result<()>;

  /// Exact-identity lookup across every partition.
  fn match_any(&self, identity: &str) -> Result<Option<CachedEntry>>;

  /// Names of all partitions currently present.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Destroy a partition and everything in it.
  fn drop_partition(&self, partition: &str) -> Result<()>;

  /// Number of entries in a partition.
  fn entry_count(&self, partition: &str) -> Result<u64>;
}
