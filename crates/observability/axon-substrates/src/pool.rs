//! Lazy name-keyed instance pools.

use crate::name::Name;
use crate::types::SubstratesResult;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;

/// A lazy, thread-safe name-to-value factory.
///
/// `get` constructs the value for a name at most once, even under
/// contention; losing callers observe the winner's instance. A factory
/// failure leaves the name unpopulated so the next caller retries.
pub struct Pool<V> {
    slots: RwLock<HashMap<Name, V>>,
    construction: Mutex<()>,
    fixed: Option<V>,
}

impl<V: Clone> Pool<V> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            fixed: None,
        }
    }

    /// Create a pool that hands out the same value for every name
    pub fn singleton(value: V) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            fixed: Some(value),
        }
    }

    /// Returns the pooled value for a name, constructing it on first call
    pub fn get<F>(&self, name: &Name, factory: F) -> SubstratesResult<V>
    where
        F: FnOnce(&Name) -> SubstratesResult<V>,
    {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        if let Some(hit) = self.slots.read().get(name) {
            return Ok(hit.clone());
        }
        let _guard = self.construction.lock();
        if let Some(hit) = self.slots.read().get(name) {
            return Ok(hit.clone());
        }
        let value = factory(name)?;
        self.slots.write().insert(name.clone(), value.clone());
        Ok(value)
    }

    /// Returns the pooled value for a name if it was already constructed
    pub fn lookup(&self, name: &Name) -> Option<V> {
        if let Some(fixed) = &self.fixed {
            return Some(fixed.clone());
        }
        self.slots.read().get(name).cloned()
    }

    /// Number of constructed values
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// True when nothing has been constructed yet
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl<V: Clone> Default for Pool<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Pool<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.slots.read().len())
            .finish()
    }
}
