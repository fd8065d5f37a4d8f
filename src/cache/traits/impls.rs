//! Concrete implementations of the core traits for standard types

use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::marker::PhantomData;

use super::core::{KeyManager, Serializer, ValueLifecycle};
use super::types_and_enums::CacheOperationError;

/// Key manager backed by the key's own `Hash` and `Eq`
///
/// The bytes a key's `Hash` impl feeds are run through CRC-32, with integers written
/// little-endian and `usize` widened to 64 bits. Bucket names therefore match across
/// restarts and platforms for one build. The std `Hash` impls make no promise about
/// what they feed between Rust releases, so a cache directory that must outlive a
/// toolchain upgrade needs a custom [`KeyManager`] hashing a canonical encoding.
#[derive(Debug)]
pub struct DefaultKeyManager<K> {
    _phantom: PhantomData<fn(&K)>,
}

impl<K> DefaultKeyManager<K> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<K> Default for DefaultKeyManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> KeyManager<K> for DefaultKeyManager<K> {
    #[inline]
    fn hash_code(&self, key: &K) -> u32 {
        let mut hasher = PortableHasher(crc32fast::Hasher::new());
        key.hash(&mut hasher);
        hasher.0.finalize()
    }

    #[inline]
    fn equals(&self, first: &K, second: &K) -> bool {
        first == second
    }
}

/// CRC-32 hasher that ignores host byte order and pointer width
struct PortableHasher(crc32fast::Hasher);

impl Hasher for PortableHasher {
    fn finish(&self) -> u64 {
        u64::from(self.0.clone().finalize())
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn write_u16(&mut self, i: u16) {
        self.write(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.write(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }

    fn write_u128(&mut self, i: u128) {
        self.write(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_i16(&mut self, i: i16) {
        self.write_u16(i as u16);
    }

    fn write_i32(&mut self, i: i32) {
        self.write_u32(i as u32);
    }

    fn write_i64(&mut self, i: i64) {
        self.write_u64(i as u64);
    }

    fn write_i128(&mut self, i: i128) {
        self.write_u128(i as u128);
    }

    fn write_isize(&mut self, i: isize) {
        self.write_u64(i as i64 as u64);
    }
}

/// Upper bound on the bytes one bincode value may claim while decoding
///
/// Length prefixes read from a damaged file are checked against this before any
/// buffer is allocated, so a corrupt record fails to load instead of aborting.
pub const BINCODE_DECODE_LIMIT: usize = 256 * 1024 * 1024;

/// Compact binary codec built on bincode's standard configuration
///
/// Decoding refuses values larger than [`BINCODE_DECODE_LIMIT`].
#[derive(Debug)]
pub struct BincodeSerializer<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for BincodeSerializer<T>
where
    T: bincode::Encode + bincode::Decode<()>,
{
    fn save(&self, mut writer: &mut dyn Write, value: &T) -> Result<(), CacheOperationError> {
        bincode::encode_into_std_write(value, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    fn load(&self, mut reader: &mut dyn Read) -> Result<T, CacheOperationError> {
        Ok(bincode::decode_from_std_read(
            &mut reader,
            bincode::config::standard().with_limit::<BINCODE_DECODE_LIMIT>(),
        )?)
    }
}

/// Human-readable codec for any serde type
#[derive(Debug)]
pub struct JsonSerializer<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn save(&self, writer: &mut dyn Write, value: &T) -> Result<(), CacheOperationError> {
        serde_json::to_writer(writer, value)?;
        Ok(())
    }

    fn load(&self, reader: &mut dyn Read) -> Result<T, CacheOperationError> {
        serde_json::from_reader(reader)
            .map_err(|e| CacheOperationError::deserialization_failed(e.to_string()))
    }
}

/// Every value weighs one unit and is simply dropped on release
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitLifecycle;

impl<V> ValueLifecycle<V> for UnitLifecycle {}
