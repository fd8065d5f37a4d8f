//! Cache traits
//!
//! Injection seams shared by the disk and memory tiers plus the crate-wide error type.

pub mod core; // KeyManager, Serializer, ValueLifecycle
pub mod impls; // Default strategies and codecs
pub mod types_and_enums; // Error enum and result alias

pub use core::{KeyManager, Serializer, ValueLifecycle};
pub use impls::{
    BINCODE_DECODE_LIMIT, BincodeSerializer, DefaultKeyManager, JsonSerializer, UnitLifecycle,
};
pub use types_and_enums::{CacheOperationError, CacheResult};
