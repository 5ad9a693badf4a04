//! Embedding Store — persisted vectors with exact cosine top-K search.
//!
//! RocksDB-backed when the `persistence` feature is on (the default), falling
//! back to an in-memory index otherwise. Both backends expose the same
//! [`EmbeddingStore`] surface so callers never branch on which is active.

mod memory;
#[cfg(feature = "persistence")]
mod rocks;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DIMENSIONS: usize = 1024;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("vector has {actual} dimensions, store requires {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding store is corrupt: {0}")]
    StoreCorrupt(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[cfg(feature = "persistence")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// What produced an embedding record. Search can be scoped to a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Agent,
    Skill,
    Knowledge,
    Insight,
    Checkpoint,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub vector: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: EmbeddingRecord,
    pub score: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Rank records against `query` and return the top `top_k`, highest score
/// first, ties broken by `source_id` then `id` for deterministic ordering.
fn rank(query: &[f32], records: Vec<EmbeddingRecord>, top_k: usize, min_similarity: f32) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = records
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(query, &record.vector);
            SearchHit { record, score }
        })
        .filter(|hit| hit.score >= min_similarity)
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.source_id.cmp(&b.record.source_id))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(top_k);
    hits
}

fn validate_dimensions(vector: &[f32]) -> Result<()> {
    if vector.len() != DIMENSIONS {
        return Err(EmbeddingError::DimensionMismatch { expected: DIMENSIONS, actual: vector.len() });
    }
    Ok(())
}

/// Backend-agnostic embedding store.
pub enum EmbeddingStore {
    Memory(memory::MemoryBackend),
    #[cfg(feature = "persistence")]
    Rocks(rocks::RocksBackend),
}

impl EmbeddingStore {
    /// Open a RocksDB-backed store at `path` when the `persistence` feature
    /// is enabled; otherwise construct an in-memory store (ignoring `path`).
    #[cfg(feature = "persistence")]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::Rocks(rocks::RocksBackend::open(path)?))
    }

    #[cfg(not(feature = "persistence"))]
    pub fn open(_path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::in_memory())
    }

    pub fn in_memory() -> Self {
        Self::Memory(memory::MemoryBackend::new())
    }

    pub fn store(&self, record: EmbeddingRecord) -> Result<()> {
        validate_dimensions(&record.vector)?;
        match self {
            Self::Memory(backend) => backend.store(record),
            #[cfg(feature = "persistence")]
            Self::Rocks(backend) => backend.store(record),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        match self {
            Self::Memory(backend) => backend.get(id),
            #[cfg(feature = "persistence")]
            Self::Rocks(backend) => backend.get(id),
        }
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        match self {
            Self::Memory(backend) => backend.delete(id),
            #[cfg(feature = "persistence")]
            Self::Rocks(backend) => backend.delete(id),
        }
    }

    pub fn count(&self, source_type: Option<SourceType>) -> Result<usize> {
        match self {
            Self::Memory(backend) => backend.count(source_type),
            #[cfg(feature = "persistence")]
            Self::Rocks(backend) => backend.count(source_type),
        }
    }

    pub fn search(
        &self,
        query: &[f32],
        source_type: Option<SourceType>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>> {
        validate_dimensions(query)?;
        let records = match self {
            Self::Memory(backend) => backend.all(source_type)?,
            #[cfg(feature = "persistence")]
            Self::Rocks(backend) => backend.all(source_type)?,
        };
        Ok(rank(query, records, top_k, min_similarity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_with(value: f32) -> Vec<f32> {
        let mut v = vec![0.0; DIMENSIONS];
        v[0] = value;
        v
    }

    #[test]
    fn cosine_similarity_is_symmetric_and_bounded() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 1.0, 0.0];
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-6);
        assert!(ab <= 1.0 && ab >= -1.0);
    }

    #[test]
    fn cosine_similarity_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn store_rejects_wrong_dimensions() {
        let store = EmbeddingStore::in_memory();
        let record = EmbeddingRecord {
            id: "r1".into(),
            source_type: SourceType::Knowledge,
            source_id: "s1".into(),
            vector: vec![0.1, 0.2],
            text: "short vector".into(),
        };
        let err = store.store(record).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn search_ranks_by_similarity_descending() {
        let store = EmbeddingStore::in_memory();
        store
            .store(EmbeddingRecord {
                id: "near".into(),
                source_type: SourceType::Knowledge,
                source_id: "s1".into(),
                vector: vec_with(1.0),
                text: "near".into(),
            })
            .unwrap();
        store
            .store(EmbeddingRecord {
                id: "far".into(),
                source_type: SourceType::Knowledge,
                source_id: "s2".into(),
                vector: vec_with(-1.0),
                text: "far".into(),
            })
            .unwrap();

        let hits = store.search(&vec_with(1.0), None, 5, 0.0).unwrap();
        assert_eq!(hits[0].record.id, "near");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_is_idempotent() {
        let store = EmbeddingStore::in_memory();
        store
            .store(EmbeddingRecord {
                id: "r1".into(),
                source_type: SourceType::Message,
                source_id: "s1".into(),
                vector: vec_with(0.5),
                text: "text".into(),
            })
            .unwrap();
        let first = store.search(&vec_with(0.5), None, 5, 0.0).unwrap();
        let second = store.search(&vec_with(0.5), None, 5, 0.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn search_scopes_by_source_type() {
        let store = EmbeddingStore::in_memory();
        store
            .store(EmbeddingRecord {
                id: "k1".into(),
                source_type: SourceType::Knowledge,
                source_id: "s1".into(),
                vector: vec_with(1.0),
                text: "knowledge".into(),
            })
            .unwrap();
        store
            .store(EmbeddingRecord {
                id: "c1".into(),
                source_type: SourceType::Checkpoint,
                source_id: "s1".into(),
                vector: vec_with(1.0),
                text: "checkpoint".into(),
            })
            .unwrap();

        let hits = store.search(&vec_with(1.0), Some(SourceType::Checkpoint), 5, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "c1");
    }

    #[test]
    fn delete_removes_record() {
        let store = EmbeddingStore::in_memory();
        store
            .store(EmbeddingRecord {
                id: "r1".into(),
                source_type: SourceType::Knowledge,
                source_id: "s1".into(),
                vector: vec_with(1.0),
                text: "text".into(),
            })
            .unwrap();
        store.delete("r1").unwrap();
        assert!(store.get("r1").unwrap().is_none());
        assert_eq!(store.count(None).unwrap(), 0);
    }
}
