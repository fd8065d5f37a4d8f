//! Per-entry metadata
//!
//! An ordered map of string names to JSON values. Values go in and out through
//! serde, so any serializable type can be stored and read back as long as both
//! sides agree on it.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::traits::CacheOperationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaData {
    values: BTreeMap<String, Value>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Raw JSON value stored under `name`
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Typed value stored under `name`
    ///
    /// Returns `None` when the name is absent or the stored value does not
    /// deserialize into `T`.
    pub fn get_value<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.values.get(name)?;
        match T::deserialize(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                log::trace!("metadata value '{}' has unexpected type: {}", name, e);
                None
            }
        }
    }

    pub fn get_value_or<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        self.get_value(name).unwrap_or(default)
    }

    /// Store `value` under `name`, replacing any previous value
    pub fn put_value<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<&mut Self, CacheOperationError> {
        let value = serde_json::to_value(value)?;
        self.values.insert(name.into(), value);
        Ok(self)
    }

    /// Store `value` only when `condition` holds
    pub fn put_value_if<T: Serialize>(
        &mut self,
        condition: bool,
        name: impl Into<String>,
        value: T,
    ) -> Result<&mut Self, CacheOperationError> {
        if condition {
            self.put_value(name, value)
        } else {
            Ok(self)
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Copy every value of `other` into this map
    pub fn extend(&mut self, other: MetaData) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}
