use std::collections::HashMap;
use std::sync::RwLock;

use super::{EmbeddingError, EmbeddingRecord, Result, SourceType};

/// In-memory embedding index, used when the `persistence` feature is off.
pub struct MemoryBackend {
    records: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { records: RwLock::new(HashMap::new()) }
    }

    pub fn store(&self, record: EmbeddingRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| EmbeddingError::StoreCorrupt("lock poisoned".into()))?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        let records = self.records.read().map_err(|_| EmbeddingError::StoreCorrupt("lock poisoned".into()))?;
        Ok(records.get(id).cloned())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| EmbeddingError::StoreCorrupt("lock poisoned".into()))?;
        records.remove(id);
        Ok(())
    }

    pub fn count(&self, source_type: Option<SourceType>) -> Result<usize> {
        Ok(self.all(source_type)?.len())
    }

    pub fn all(&self, source_type: Option<SourceType>) -> Result<Vec<EmbeddingRecord>> {
        let records = self.records.read().map_err(|_| EmbeddingError::StoreCorrupt("lock poisoned".into()))?;
        Ok(records
            .values()
            .filter(|r| source_type.map_or(true, |t| r.source_type == t))
            .cloned()
            .collect())
    }
}
