//! Cache tiers
//!
//! The disk tier persists entries as record files under a cache directory; the
//! memory tier keeps values in process with scoped ownership. Both score and evict
//! through the shared machinery in `cache::types::eviction`, each on its own
//! background cleaner.

pub mod disk;
pub mod memory;

pub use disk::{DiskCache, Entry, MetaData};
pub use memory::{Access, MemoryCache, ScopeToken, ValueRef};
