//! Many-to-many relation between values and scope tokens
//!
//! Both directions are stored and only ever updated together, so a value appears
//! in a token's set exactly when the token appears in the value's set.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

#[derive(Debug)]
pub struct AssociationSet<V, T> {
    /// value -> tokens it is associated with
    values: HashMap<V, HashSet<T>>,
    /// token -> values associated with it
    tokens: HashMap<T, HashSet<V>>,
}

impl<V, T> Default for AssociationSet<V, T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            tokens: HashMap::new(),
        }
    }
}

impl<V, T> AssociationSet<V, T>
where
    V: Hash + Eq + Clone,
    T: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` with no associations; no-op if already known
    pub fn add(&mut self, value: V) {
        self.values.entry(value).or_default();
    }

    #[inline]
    pub fn contains(&self, value: &V) -> bool {
        self.values.contains_key(value)
    }

    /// Number of registered values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Link a registered value with `token`
    ///
    /// Returns `false` and changes nothing when `value` was never added.
    pub fn associate(&mut self, value: &V, token: T) -> bool {
        let Some(value_tokens) = self.values.get_mut(value) else {
            return false;
        };
        value_tokens.insert(token.clone());
        self.tokens.entry(token).or_default().insert(value.clone());
        true
    }

    /// Unlink `value` from `token`, dropping the token once nothing refers to it
    pub fn disassociate(&mut self, value: &V, token: &T) {
        if let Some(value_tokens) = self.values.get_mut(value) {
            value_tokens.remove(token);
        }
        self.unlink_token(value, token);
    }

    /// Forget `value` together with all of its associations
    pub fn remove(&mut self, value: &V) -> bool {
        let Some(value_tokens) = self.values.remove(value) else {
            return false;
        };
        for token in &value_tokens {
            self.unlink_token(value, token);
        }
        true
    }

    fn unlink_token(&mut self, value: &V, token: &T) {
        if let Some(token_values) = self.tokens.get_mut(token) {
            token_values.remove(value);
            if token_values.is_empty() {
                self.tokens.remove(token);
            }
        }
    }

    /// Tokens `value` is associated with
    pub fn associations(&self, value: &V) -> Vec<T> {
        self.values
            .get(value)
            .map(|tokens| tokens.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_associations(&self, value: &V) -> bool {
        self.values.get(value).is_some_and(|tokens| !tokens.is_empty())
    }

    /// Values associated with `token`, copied so the caller may mutate the set
    pub fn associated(&self, token: &T) -> Vec<V> {
        self.tokens
            .get(token)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.tokens.clear();
    }
}
