use std::path::Path;

use rocksdb::{Options, DB};

use super::{EmbeddingError, EmbeddingRecord, Result, SourceType};

const CF_RECORDS: &str = "embedding_records";

/// RocksDB-backed embedding index. One column family, keyed by record id;
/// `all` does a full column-family scan since similarity ranking needs every
/// candidate vector regardless of key order (no approximate-nearest-neighbor
/// index here, per the exact-search invariant).
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let db = DB::open_cf(&opts, path, [CF_RECORDS])?;
        Ok(Self { db })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_RECORDS)
            .ok_or_else(|| EmbeddingError::StoreCorrupt(format!("missing column family {CF_RECORDS}")))
    }

    /// Records (vector included) are stored as JSON, per spec.md's
    /// "vectors stored as JSON arrays (to keep the format portable)" —
    /// RocksDB only supplies the keyed persistence, not the encoding.
    pub fn store(&self, record: EmbeddingRecord) -> Result<()> {
        let cf = self.cf()?;
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| EmbeddingError::StoreCorrupt(format!("serialize: {e}")))?;
        self.db.put_cf(cf, record.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| EmbeddingError::StoreCorrupt(format!("deserialize: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let cf = self.cf()?;
        self.db.delete_cf(cf, id.as_bytes())?;
        Ok(())
    }

    pub fn count(&self, source_type: Option<SourceType>) -> Result<usize> {
        Ok(self.all(source_type)?.len())
    }

    pub fn all(&self, source_type: Option<SourceType>) -> Result<Vec<EmbeddingRecord>> {
        let cf = self.cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, bytes) = item?;
            let record: EmbeddingRecord = serde_json::from_slice(&bytes)
                .map_err(|e| EmbeddingError::StoreCorrupt(format!("deserialize: {e}")))?;
            if source_type.map_or(true, |t| record.source_type == t) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
