// src/storage/memory.rs
//
// Process-local store. Clones share the same rows, so a caller can keep a
// handle for reading while the writer thread owns another.

use super::{timestamp_now, DeleteScope, EvidenceRecord, EvidenceStore};
use crate::error::StoreError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<(EvidenceRecord, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEvidenceStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn insert(&self, violation_type: &str, entity_id: &str, image: &[u8]) -> Result<i64, StoreError> {
        let mut state = self.state();
        state.next_id += 1;
        let record = EvidenceRecord {
            id: state.next_id,
            violation_type: violation_type.to_string(),
            entity_id: entity_id.to_string(),
            timestamp: timestamp_now(),
        };
        let id = record.id;
        state.rows.push((record, image.to_vec()));
        Ok(id)
    }

    fn list(&self) -> Result<Vec<EvidenceRecord>, StoreError> {
        Ok(self.state().rows.iter().rev().map(|(r, _)| r.clone()).collect())
    }

    fn fetch_image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .state()
            .rows
            .iter()
            .find(|(r, _)| r.id == id)
            .map(|(_, image)| image.clone()))
    }

    fn delete(&self, scope: &DeleteScope) -> Result<usize, StoreError> {
        let mut state = self.state();
        let before = state.rows.len();
        match scope {
            DeleteScope::All => state.rows.clear(),
            DeleteScope::Ids(ids) => state.rows.retain(|(r, _)| !ids.contains(&r.id)),
        }
        Ok(before - state.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_rows() {
        let store = MemoryEvidenceStore::new();
        let reader = store.clone();
        let id = store.insert("wrong_way", "id_4", b"img").unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.fetch_image(id).unwrap(), Some(b"img".to_vec()));
        assert_eq!(reader.list().unwrap()[0].entity_id, "id_4");
    }

    #[test]
    fn test_delete_scopes() {
        let store = MemoryEvidenceStore::new();
        let a = store.insert("collision", "id_1_id_2", b"a").unwrap();
        store.insert("collision", "id_1_id_3", b"b").unwrap();
        assert_eq!(store.delete(&DeleteScope::Ids(vec![a])).unwrap(), 1);
        assert_eq!(store.delete(&DeleteScope::All).unwrap(), 1);
        assert!(store.is_empty());
    }
}
