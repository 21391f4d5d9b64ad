//! Cache partition store: durable, named key→response mappings.
//!
//! Partitions are version-qualified and disjoint; whole-partition deletion
//! at activation time is the only eviction mechanism.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::PartitionStore;
