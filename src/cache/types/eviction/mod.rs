//! Eviction candidate management and selection
//!
//! `candidate` turns arbitrary sources (files, memory holders) into scored items;
//! `selector` partitions those items and trims them against a size budget.

pub mod candidate;
pub mod selector;

pub use candidate::{Cleanable, CleanableItem, Evictable, ItemLoader};
pub use selector::{EvictionReport, Partition, classify, clean, clean_partition, clean_sources};
