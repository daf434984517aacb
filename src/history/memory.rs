use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::HistoryStore;
use crate::error::HistoryError;
use crate::HistoryRecord;

/// In-memory history store. Used when no history file is configured and in
/// tests; records do not survive a restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: DashMap<Uuid, HistoryRecord>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all stored records, oldest timestamp first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        let mut all: Vec<HistoryRecord> = self.records.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.timestamp);
        all
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<HistoryRecord>, HistoryError> {
        Ok(self.records.get(id).map(|e| e.value().clone()))
    }
}
