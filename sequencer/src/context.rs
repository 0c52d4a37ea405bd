//! Artifact store shared by the steps of a chain.
//!
//! Earlier steps publish what they produce (loaded scripts, fetched models)
//! and later steps read it back by key and type. This is the only shared
//! state between steps; the chain's ordering is what makes reads safe.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Artifact = Arc<dyn Any + Send + Sync>;

/// Cheaply cloneable handle to a chain's artifacts.
#[derive(Clone, Default)]
pub struct Context {
    artifacts: Arc<RwLock<HashMap<String, Artifact>>>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `key`. Returns `true` if an earlier artifact
    /// with the same key was replaced.
    pub fn publish<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        tracing::trace!(key = %key, "Publishing artifact");
        self.write().insert(key, Arc::new(value)).is_some()
    }

    /// Read the artifact under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let artifact = self.read().get(key).cloned()?;
        artifact.downcast::<T>().ok()
    }

    /// Read the artifact under `key`, publishing `make()` first if the key is
    /// free. `None` if the key holds a value of another type.
    pub fn get_or_publish_with<T, F>(&self, key: &str, make: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let artifact = {
            let mut artifacts = self.write();
            let entry = artifacts
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(make()) as Artifact);
            Arc::clone(entry)
        };
        artifact.downcast::<T>().ok()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Published keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Artifact>> {
        self.artifacts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Artifact>> {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .finish()
    }
}
