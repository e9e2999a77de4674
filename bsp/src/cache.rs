use std::{
    any::{Any, TypeId},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use ahash::AHashMap;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking inserter leaves the map itself intact
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared values keyed by name, usually a texture or map name.
pub struct Cache<T> {
    name: String,
    entries: Mutex<AHashMap<String, Arc<T>>>,
}

impl<T> Cache<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        lock(&self.entries).get(key).cloned()
    }

    /// Return the cached value, or build and insert it under the same lock.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = lock(&self.entries);
        if let Some(v) = entries.get(key) {
            return v.clone();
        }
        log::trace!("{} cache miss: {}", self.name, key);
        let v = Arc::new(make());
        entries.insert(key.to_owned(), v.clone());
        v
    }

    /// As `get_or_insert_with`, but a failed build inserts nothing.
    pub fn try_get_or_insert_with<E>(
        &self,
        key: &str,
        make: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut entries = lock(&self.entries);
        if let Some(v) = entries.get(key) {
            return Ok(v.clone());
        }
        let v = Arc::new(make()?);
        entries.insert(key.to_owned(), v.clone());
        Ok(v)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

type AnyCache = Arc<dyn Any + Send + Sync>;

/// Owns the caches of one running set of maps. Dropping the session drops them all.
#[derive(Default)]
pub struct Session {
    caches: Mutex<AHashMap<(String, TypeId), AnyCache>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache called `name` holding `T`, created on first use.
    pub fn cache<T: Send + Sync + 'static>(&self, name: &str) -> Arc<Cache<T>> {
        let mut caches = lock(&self.caches);
        let entry = caches
            .entry((name.to_owned(), TypeId::of::<T>()))
            .or_insert_with(|| Arc::new(Cache::<T>::new(name)) as AnyCache)
            .clone();
        drop(caches);

        match entry.downcast::<Cache<T>>() {
            Ok(cache) => cache,
            // keyed by TypeId, so the stored cache always holds T
            Err(_) => Arc::new(Cache::new(name)),
        }
    }
}
