use std::sync::Arc;

use log::{error, warn};

use crate::{error::StoreError, models::ScanRecord};

use super::{KeyValueStore, MemoryStorage};

pub const STORAGE_KEY: &str = "retina_guardian_data";

fn unavailable(err: anyhow::Error) -> StoreError {
    StoreError::Unavailable(format!("{err:#}"))
}

/// Holds at most one [`ScanRecord`] under [`STORAGE_KEY`].
///
/// `save`/`load`/`exists`/`clear` never fail: storage problems are logged
/// and degrade to "nothing stored". The `try_*` variants report them.
#[derive(Clone)]
pub struct ScanStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ScanStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub async fn try_save(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(record).map_err(StoreError::Serialize)?;
        self.backend
            .set(STORAGE_KEY, &serialized)
            .await
            .map_err(unavailable)
    }

    pub async fn try_load(&self) -> Result<Option<ScanRecord>, StoreError> {
        let Some(raw) = self.backend.get(STORAGE_KEY).await.map_err(unavailable)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(StoreError::Malformed)
    }

    pub async fn try_clear(&self) -> Result<(), StoreError> {
        self.backend.remove(STORAGE_KEY).await.map_err(unavailable)
    }

    pub async fn save(&self, record: &ScanRecord) {
        if let Err(err) = self.try_save(record).await {
            error!("Failed to save retina data: {err}");
        }
    }

    pub async fn load(&self) -> Option<ScanRecord> {
        match self.try_load().await {
            Ok(record) => record,
            Err(StoreError::Malformed(err)) => {
                warn!("Ignoring malformed retina data: {err}");
                None
            }
            Err(err) => {
                error!("Failed to retrieve retina data: {err}");
                None
            }
        }
    }

    /// True when a value sits under the key, even one that fails to parse.
    pub async fn exists(&self) -> bool {
        self.backend.contains(STORAGE_KEY).await.unwrap_or_else(|err| {
            error!("Failed to check for retina data: {err:#}");
            false
        })
    }

    pub async fn clear(&self) {
        if let Err(err) = self.try_clear().await {
            error!("Failed to clear retina data: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::{
        models::{ScanId, SignaturePoint, PATTERN_COUNT, SIGNATURE_POINT_COUNT},
        storage::StorageFuture,
    };

    struct BrokenStorage;

    fn fail<'a, T: Send + 'a>(reason: &'static str) -> StorageFuture<'a, T> {
        Box::pin(async move { Err(anyhow!(reason)) })
    }

    impl KeyValueStore for BrokenStorage {
        fn get<'a>(&'a self, _key: &'a str) -> StorageFuture<'a, Option<String>> {
            fail("storage disabled")
        }

        fn set<'a>(&'a self, _key: &'a str, _value: &'a str) -> StorageFuture<'a, ()> {
            fail("quota exceeded")
        }

        fn remove<'a>(&'a self, _key: &'a str) -> StorageFuture<'a, ()> {
            fail("storage disabled")
        }
    }

    fn record(id: &str) -> ScanRecord {
        ScanRecord {
            id: ScanId::parse(id).unwrap(),
            timestamp: 1_712_345_678_901,
            image_data: "data:image/png;base64,iVBORw0KGgo=".into(),
            patterns: std::array::from_fn(|i| (i * 8) as u8),
            signature_points: std::array::from_fn(|i| SignaturePoint {
                x: i as f64 / 15.0,
                y: 1.0 - (i as f64 + 1.0) / 16.0,
                intensity: 0.5 + i as f64 / 31.0,
            }),
            match_score: None,
        }
    }

    #[tokio::test]
    async fn load_after_save_returns_same_record() {
        let store = ScanStore::in_memory();
        assert_eq!(store.load().await, None);

        let saved = record("abcdef0123456789");
        store.save(&saved).await;

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.patterns.len(), PATTERN_COUNT);
        assert_eq!(loaded.signature_points.len(), SIGNATURE_POINT_COUNT);
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let store = ScanStore::in_memory();
        store.save(&record("1111111111111111")).await;
        store.save(&record("2222222222222222")).await;
        store.save(&record("2222222222222222")).await;

        assert_eq!(store.load().await.unwrap().id.as_str(), "2222222222222222");
    }

    #[tokio::test]
    async fn clear_twice_leaves_nothing_stored() {
        let store = ScanStore::in_memory();
        store.save(&record("abcdef0123456789")).await;

        store.clear().await;
        assert!(!store.exists().await);
        store.clear().await;
        assert!(!store.exists().await);
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn malformed_value_exists_but_loads_as_absent() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set(STORAGE_KEY, "{not json").await.unwrap();
        let store = ScanStore::new(backend);

        assert!(store.exists().await);
        assert_eq!(store.load().await, None);
        assert!(matches!(store.try_load().await, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn broken_backend_degrades_silently() {
        let store = ScanStore::new(Arc::new(BrokenStorage));

        store.save(&record("abcdef0123456789")).await;
        store.clear().await;
        assert!(!store.exists().await);
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn broken_backend_is_reported_by_try_variants() {
        let store = ScanStore::new(Arc::new(BrokenStorage));

        assert!(matches!(
            store.try_save(&record("abcdef0123456789")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(store.try_load().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.try_clear().await, Err(StoreError::Unavailable(_))));
    }
}
