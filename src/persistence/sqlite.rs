//! SQLite-backed stores.
//!
//! One database file holds parameter chunks, parameter manifests and fold
//! records. `compare_and_set` is a single conditional `UPDATE`, so it stays
//! correct when several processes share the same file.

use super::chunk_storage::{ParameterStore, StorageError};
use super::chunks::{ParameterChunk, ParameterManifest};
use super::fold_records::{Category, FoldRecord, FoldRecordStore};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS parameter_chunks (
        purpose TEXT NOT NULL,
        idx INTEGER NOT NULL,
        bytes BLOB NOT NULL,
        PRIMARY KEY (purpose, idx)
    )",
    "CREATE TABLE IF NOT EXISTS parameter_manifests (
        purpose TEXT PRIMARY KEY NOT NULL,
        total_chunks INTEGER NOT NULL,
        sha256 BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fold_records (
        category TEXT PRIMARY KEY NOT NULL,
        proof BLOB,
        num_folds INTEGER NOT NULL DEFAULT 0,
        finalized INTEGER NOT NULL DEFAULT 0
    )",
];

/// Durable parameter and fold record store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Creates the schema and seeds an empty record for every category.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened fold store");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        for category in Category::ALL {
            sqlx::query(
                "INSERT OR IGNORE INTO fold_records (category, proof, num_folds, finalized)
                 VALUES (?, NULL, 0, 0)",
            )
            .bind(category.as_str())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_u64(value: i64, column: &str) -> Result<u64, StorageError> {
    u64::try_from(value)
        .map_err(|_| StorageError::Fault(format!("negative value in column {}", column)))
}

fn to_i64(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::InvalidRecord("fold count overflow".to_string()))
}

#[async_trait]
impl ParameterStore for SqliteStore {
    async fn put_chunk(
        &self,
        purpose: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO parameter_chunks (purpose, idx, bytes) VALUES (?, ?, ?)")
            .bind(purpose)
            .bind(i64::from(index))
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn chunks(&self, purpose: &str) -> Result<Vec<ParameterChunk>, StorageError> {
        let rows = sqlx::query("SELECT idx, bytes FROM parameter_chunks WHERE purpose = ? ORDER BY idx")
            .bind(purpose)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let idx: i64 = row.try_get("idx")?;
                let bytes: Vec<u8> = row.try_get("bytes")?;
                let index = u32::try_from(idx)
                    .map_err(|_| StorageError::Fault(format!("chunk index {} out of range", idx)))?;
                Ok(ParameterChunk::new(index, bytes))
            })
            .collect()
    }

    async fn put_manifest(&self, manifest: &ParameterManifest) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO parameter_manifests (purpose, total_chunks, sha256)
             VALUES (?, ?, ?)",
        )
        .bind(&manifest.purpose)
        .bind(i64::from(manifest.total_chunks))
        .bind(manifest.sha256.as_slice())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_chunks(&self, purpose: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM parameter_chunks WHERE purpose = ?")
            .bind(purpose)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM parameter_manifests WHERE purpose = ?")
            .bind(purpose)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_parameters(
        &self,
        manifest: &ParameterManifest,
        chunks: &[ParameterChunk],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM parameter_chunks WHERE purpose = ?")
            .bind(&manifest.purpose)
            .execute(&mut *tx)
            .await?;
        for chunk in chunks {
            sqlx::query("INSERT INTO parameter_chunks (purpose, idx, bytes) VALUES (?, ?, ?)")
                .bind(&manifest.purpose)
                .bind(i64::from(chunk.index))
                .bind(chunk.bytes.as_slice())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT OR REPLACE INTO parameter_manifests (purpose, total_chunks, sha256)
             VALUES (?, ?, ?)",
        )
        .bind(&manifest.purpose)
        .bind(i64::from(manifest.total_chunks))
        .bind(manifest.sha256.as_slice())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn manifest(&self, purpose: &str) -> Result<Option<ParameterManifest>, StorageError> {
        let row = sqlx::query("SELECT total_chunks, sha256 FROM parameter_manifests WHERE purpose = ?")
            .bind(purpose)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let total: i64 = row.try_get("total_chunks")?;
        let digest: Vec<u8> = row.try_get("sha256")?;
        let sha256: [u8; 32] = digest
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Fault("manifest digest is not 32 bytes".to_string()))?;

        Ok(Some(ParameterManifest {
            purpose: purpose.to_string(),
            total_chunks: u32::try_from(total)
                .map_err(|_| StorageError::Fault("manifest chunk count out of range".to_string()))?,
            sha256,
        }))
    }
}

#[async_trait]
impl FoldRecordStore for SqliteStore {
    async fn get(&self, category: Category) -> Result<FoldRecord, StorageError> {
        let row = sqlx::query("SELECT proof, num_folds, finalized FROM fold_records WHERE category = ?")
            .bind(category.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(FoldRecord::empty(category));
        };

        let proof_bytes: Option<Vec<u8>> = row.try_get("proof")?;
        let num_folds: i64 = row.try_get("num_folds")?;
        let finalized: bool = row.try_get("finalized")?;

        Ok(FoldRecord {
            category,
            proof_bytes,
            num_folds: to_u64(num_folds, "num_folds")?,
            finalized,
        })
    }

    async fn compare_and_set(
        &self,
        category: Category,
        expected_num_folds: u64,
        record: FoldRecord,
    ) -> Result<(), StorageError> {
        if record.category != category {
            return Err(StorageError::InvalidRecord(format!(
                "record for {} written under {}",
                record.category, category
            )));
        }
        record.validate()?;

        let result = sqlx::query(
            "UPDATE fold_records
             SET proof = ?, num_folds = ?, finalized = ?
             WHERE category = ? AND num_folds = ? AND finalized = 0",
        )
        .bind(record.proof_bytes.as_deref())
        .bind(to_i64(record.num_folds)?)
        .bind(record.finalized)
        .bind(category.as_str())
        .bind(to_i64(expected_num_folds)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current = self.get(category).await?;
        Err(StorageError::Conflict {
            category,
            expected: expected_num_folds,
            actual: current.num_folds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("foldvault.db"))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_seeded_empty_records() {
        let (store, _dir) = open_temp().await;
        for record in store.all().await.unwrap() {
            assert_eq!(record, FoldRecord::empty(record.category));
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_roundtrip() {
        let (store, _dir) = open_temp().await;
        let record = FoldRecord::empty(Category::Attendee).folded(vec![1, 2, 3]);

        store
            .compare_and_set(Category::Attendee, 0, record.clone())
            .await
            .unwrap();
        assert_eq!(store.get(Category::Attendee).await.unwrap(), record);

        let stale = FoldRecord::empty(Category::Attendee).folded(vec![9]);
        match store.compare_and_set(Category::Attendee, 0, stale).await {
            Err(StorageError::Conflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finalized_record_rejects_writes() {
        let (store, _dir) = open_temp().await;
        let folded = FoldRecord::empty(Category::Talk).folded(vec![1]);
        store
            .compare_and_set(Category::Talk, 0, folded.clone())
            .await
            .unwrap();
        let finalized = folded.finalized_with(vec![2]);
        store
            .compare_and_set(Category::Talk, 1, finalized.clone())
            .await
            .unwrap();

        let result = store
            .compare_and_set(Category::Talk, 1, finalized.folded(vec![3]))
            .await;
        assert!(matches!(result, Err(StorageError::Conflict { .. })));
        assert_eq!(store.get(Category::Talk).await.unwrap(), finalized);
    }

    #[tokio::test]
    async fn test_chunks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foldvault.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            crate::persistence::import_parameters(&store, "membership", b"0123456789", 4)
                .await
                .unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.reconstruct("membership").await.unwrap(), b"0123456789");
        let manifest = store.manifest("membership").await.unwrap().unwrap();
        assert_eq!(manifest.total_chunks, 3);
    }

    #[tokio::test]
    async fn test_reimport_smaller_blob_replaces_chunks() {
        let (store, _dir) = open_temp().await;
        let large = vec![7u8; 3000];
        let small = vec![3u8; 1500];

        crate::persistence::import_parameters(&store, "membership", &large, 1000)
            .await
            .unwrap();
        crate::persistence::import_parameters(&store, "membership", &small, 1000)
            .await
            .unwrap();

        assert_eq!(store.list_indices("membership").await.unwrap(), vec![0, 1]);
        assert_eq!(store.reconstruct("membership").await.unwrap(), small);

        store.clear_chunks("membership").await.unwrap();
        assert!(store.chunks("membership").await.unwrap().is_empty());
        assert!(store.manifest("membership").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_middle_chunk_is_incomplete() {
        let (store, _dir) = open_temp().await;
        store.put_chunk("membership", 0, b"a").await.unwrap();
        store.put_chunk("membership", 2, b"c").await.unwrap();

        assert!(matches!(
            store.reconstruct("membership").await,
            Err(StorageError::IncompleteParameters { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_record_rejected_before_write() {
        let (store, _dir) = open_temp().await;
        let bad = FoldRecord {
            category: Category::Talk,
            proof_bytes: None,
            num_folds: 1,
            finalized: false,
        };

        assert!(matches!(
            store.compare_and_set(Category::Talk, 0, bad).await,
            Err(StorageError::InvalidRecord(_))
        ));
    }
}
