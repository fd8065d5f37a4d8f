//! Stashbox - two-tier key/value cache
//!
//! A persistent disk tier and a volatile memory tier with throttled background
//! eviction.
//!
//! # Features
//!
//! - **Disk tier**: one record file per entry, grouped into hash buckets and
//!   installed by atomic rename, with payload files in cache-owned scratch space
//! - **Memory tier**: values shared between scopes, released only when the last
//!   scope lets go
//! - **Eviction**: age and size budgets with a protection window for young items
//! - **Background cleaning**: at most one pass per cache, triggered by elapsed time
//!   or the number of modifications

pub mod builder;
pub mod cache;
pub mod prelude;

pub use builder::{DiskCacheBuilder, MemoryCacheBuilder};
pub use prelude::*;
