//! In-memory stores for testing and embedding.
//!
//! Implements both [`ParameterStore`] and [`FoldRecordStore`] over
//! mutex-guarded maps. Every operation is atomic with respect to the others,
//! so `compare_and_set` has the same semantics as the SQLite backend.

use super::chunk_storage::{ParameterStore, StorageError};
use super::chunks::{ParameterChunk, ParameterManifest};
use super::fold_records::{check_write, Category, FoldRecord, FoldRecordStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory parameter and fold record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    chunks: HashMap<String, BTreeMap<u32, Vec<u8>>>,
    manifests: HashMap<String, ParameterManifest>,
    records: HashMap<Category, FoldRecord>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage fault (for tests).
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes = fail;
        }
    }

    /// Remove a stored chunk (for test setup).
    pub fn remove_chunk(&self, purpose: &str, index: u32) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(chunks) = state.chunks.get_mut(purpose) {
                chunks.remove(&index);
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Fault("memory store lock poisoned".to_string()))
    }

    fn lock_for_write(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        let state = self.lock()?;
        if state.fail_writes {
            return Err(StorageError::Fault("injected write failure".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl ParameterStore for MemoryStore {
    async fn put_chunk(
        &self,
        purpose: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let mut state = self.lock_for_write()?;
        state
            .chunks
            .entry(purpose.to_string())
            .or_default()
            .insert(index, bytes.to_vec());
        Ok(())
    }

    async fn chunks(&self, purpose: &str) -> Result<Vec<ParameterChunk>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .chunks
            .get(purpose)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|(index, bytes)| ParameterChunk::new(*index, bytes.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_manifest(&self, manifest: &ParameterManifest) -> Result<(), StorageError> {
        let mut state = self.lock_for_write()?;
        state
            .manifests
            .insert(manifest.purpose.clone(), manifest.clone());
        Ok(())
    }

    async fn manifest(&self, purpose: &str) -> Result<Option<ParameterManifest>, StorageError> {
        Ok(self.lock()?.manifests.get(purpose).cloned())
    }

    async fn clear_chunks(&self, purpose: &str) -> Result<(), StorageError> {
        let mut state = self.lock_for_write()?;
        state.chunks.remove(purpose);
        state.manifests.remove(purpose);
        Ok(())
    }

    async fn replace_parameters(
        &self,
        manifest: &ParameterManifest,
        chunks: &[ParameterChunk],
    ) -> Result<(), StorageError> {
        let mut state = self.lock_for_write()?;
        let stored = chunks
            .iter()
            .map(|chunk| (chunk.index, chunk.bytes.clone()))
            .collect();
        state.chunks.insert(manifest.purpose.clone(), stored);
        state
            .manifests
            .insert(manifest.purpose.clone(), manifest.clone());
        Ok(())
    }
}

#[async_trait]
impl FoldRecordStore for MemoryStore {
    async fn get(&self, category: Category) -> Result<FoldRecord, StorageError> {
        let state = self.lock()?;
        Ok(state
            .records
            .get(&category)
            .cloned()
            .unwrap_or_else(|| FoldRecord::empty(category)))
    }

    async fn compare_and_set(
        &self,
        category: Category,
        expected_num_folds: u64,
        record: FoldRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.lock_for_write()?;
        let current = state
            .records
            .get(&category)
            .cloned()
            .unwrap_or_else(|| FoldRecord::empty(category));

        check_write(category, expected_num_folds, &current, &record)?;
        state.records.insert(category, record);
        Ok(())
    }
}
