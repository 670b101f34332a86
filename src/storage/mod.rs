//! Key-value persistence and the single-record scan store built on it.

mod scan_store;

use std::{
    collections::HashMap,
    future::{ready, Future},
    pin::Pin,
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Result};

pub use scan_store::{ScanStore, STORAGE_KEY};

pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// String key-value backend in the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>>;
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StorageFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;

    fn contains<'a>(&'a self, key: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move { Ok(self.get(key).await?.is_some()) })
    }
}

/// Process-local backend; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("memory storage lock poisoned")
}

impl MemoryStorage {
    fn with_entries<T>(&self, apply: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        Ok(apply(&mut entries))
    }
}

impl KeyValueStore for MemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(ready(self.with_entries(|entries| entries.get(key).cloned())))
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(ready(self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })))
    }

    fn remove<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(ready(self.with_entries(|entries| {
            entries.remove(key);
        })))
    }

    fn contains<'a>(&'a self, key: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(ready(self.with_entries(|entries| entries.contains_key(key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_basic_operations() {
        let storage = MemoryStorage::new();

        assert!(!storage.contains("k").await.unwrap());
        storage.set("k", "v").await.unwrap();
        assert!(storage.contains("k").await.unwrap());
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));

        storage.remove("k").await.unwrap();
        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
    }
}
