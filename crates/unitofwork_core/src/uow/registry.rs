//! Type-keyed cache of repository instances.
//!
//! # Invariants
//! - At most one instance per key type.
//! - The factory runs only when the key is absent.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[derive(Default)]
pub struct RepositoryCache {
    repositories: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance cached under `K`, creating it with `make` first
    /// when absent.
    ///
    /// Returns `None` when the cached instance for `K` is not an `R`.
    pub fn get_or_insert_with<K, R>(&mut self, make: impl FnOnce() -> R) -> Option<Arc<R>>
    where
        K: 'static,
        R: Any + Send + Sync,
    {
        let entry = self
            .repositories
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Arc::new(make()) as Arc<dyn Any + Send + Sync>);
        Arc::clone(entry).downcast::<R>().ok()
    }

    pub fn contains<K: 'static>(&self) -> bool {
        self.repositories.contains_key(&TypeId::of::<K>())
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn clear(&mut self) {
        self.repositories.clear();
    }
}

impl Debug for RepositoryCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("len", &self.repositories.len())
            .finish()
    }
}
