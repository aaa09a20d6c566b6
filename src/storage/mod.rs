// src/storage/mod.rs
//
// Evidence persistence. The frame loop hands accepted captures to the
// background writer; the writer owns the store.

pub mod memory;
pub mod renderer;
pub mod sqlite;
pub mod writer;

pub use memory::MemoryEvidenceStore;
pub use renderer::{EvidenceRenderer, MetadataRenderer};
pub use sqlite::SqliteEvidenceStore;
pub use writer::{EvidenceWriter, WriterMessage};

use crate::error::StoreError;
use serde::Serialize;

/// Stored evidence row, without the image payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    pub id: i64,
    pub violation_type: String,
    pub entity_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteScope {
    All,
    Ids(Vec<i64>),
}

/// One unit of work for the background writer
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub violation_type: String,
    pub entity_id: String,
    pub image_bytes: Vec<u8>,
}

pub trait EvidenceStore: Send {
    fn insert(&self, violation_type: &str, entity_id: &str, image: &[u8]) -> Result<i64, StoreError>;

    /// Newest first
    fn list(&self) -> Result<Vec<EvidenceRecord>, StoreError>;

    fn fetch_image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError>;

    /// Rows removed
    fn delete(&self, scope: &DeleteScope) -> Result<usize, StoreError>;
}

pub(crate) fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
