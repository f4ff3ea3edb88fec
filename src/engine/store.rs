//! Record lookup.
//!
//! The chain builder only needs "give me the record with this id". Authoring
//! tools own the real store; [`RecordStore`] is the in-memory version used by
//! the CLI and tests, loadable from a JSON array of records.

use crate::model::{CtaId, CtaRecord};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read record store: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record store JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate record id {0}")]
    DuplicateId(CtaId),
}

/// Fetch a record by id. Missing ids are `None`, never an error.
pub trait RecordLookup {
    fn lookup(&self, id: CtaId) -> Option<CtaRecord>;
}

impl<F> RecordLookup for F
where
    F: Fn(CtaId) -> Option<CtaRecord>,
{
    fn lookup(&self, id: CtaId) -> Option<CtaRecord> {
        self(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: HashMap<CtaId, CtaRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate ids.
    pub fn from_records(records: impl IntoIterator<Item = CtaRecord>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for record in records {
            let id = record.id;
            if store.records.insert(id, record).is_some() {
                return Err(StoreError::DuplicateId(id));
            }
        }
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let records: Vec<CtaRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Insert or replace a record.
    pub fn upsert(&mut self, record: CtaRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: CtaId) -> Option<&CtaRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordLookup for RecordStore {
    fn lookup(&self, id: CtaId) -> Option<CtaRecord> {
        self.records.get(&id).cloned()
    }
}
