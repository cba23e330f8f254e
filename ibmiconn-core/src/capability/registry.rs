//! Capability registry for looking up implementations by ID

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry for pluggable implementations of one capability kind
///
/// Implementations are registered under a string identifier and looked up
/// by it. Registering an identifier twice replaces the earlier
/// implementation. The registry is shared behind an `Arc` so extensions can
/// register while the core is running.
pub struct CapabilityRegistry<T: ?Sized> {
    entries: RwLock<BTreeMap<String, Arc<T>>>,
}

impl<T: ?Sized> CapabilityRegistry<T> {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers an implementation, returning the one it replaced
    pub fn register(&self, id: impl Into<String>, implementation: Arc<T>) -> Option<Arc<T>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), implementation)
    }

    /// Removes an implementation, returning it if it was registered
    pub fn unregister(&self, id: &str) -> Option<Arc<T>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Gets an implementation by its identifier
    ///
    /// # Returns
    /// The implementation if found, or `None` if not registered
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Returns all registered identifiers in sorted order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Returns all registered implementations ordered by identifier
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, imp)| (id.clone(), Arc::clone(imp)))
            .collect()
    }

    /// Returns the number of registered implementations
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for CapabilityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for CapabilityRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
