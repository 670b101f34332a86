use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::Database,
    storage::{KeyValueStore, StorageFuture},
};

impl Database {
    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM local_storage WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read key {key}"))?;
            Ok(value)
        })
        .await
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO local_storage (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key {key}"))?;
            Ok(())
        })
        .await
    }

    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete key {key}"))?;
            Ok(())
        })
        .await
    }
}

impl KeyValueStore for Database {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(self.get_item(key))
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.set_item(key, value))
    }

    fn remove<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.remove_item(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("store.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn set_then_get_returns_latest_value() {
        let (_dir, db) = open_temp();

        assert_eq!(db.get_item("k").await.unwrap(), None);
        db.set_item("k", "first").await.unwrap();
        db.set_item("k", "second").await.unwrap();
        assert_eq!(db.get_item("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn remove_missing_key_is_noop() {
        let (_dir, db) = open_temp();

        db.remove_item("absent").await.unwrap();
        db.set_item("k", "v").await.unwrap();
        db.remove_item("k").await.unwrap();
        assert_eq!(db.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.set_item("k", "persisted").await.unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.get_item("k").await.unwrap().as_deref(), Some("persisted"));
    }
}
