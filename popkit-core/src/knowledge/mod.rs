//! Knowledge Store — extends the embedding store with typed, project-scoped
//! knowledge records and a human-readable jsonl mirror.
//!
//! Each write lands in two places: the embedding index (for recall by
//! similarity) and `<kind>/<project>.jsonl` (for grepping and debugging
//! without touching the database). No deduplication happens at write time —
//! `recall`'s similarity threshold is the only thing keeping near-duplicates
//! from crowding results.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::{EmbeddingError, EmbeddingRecord, EmbeddingStore, SourceType};

const DEFAULT_RECALL_LIMIT: usize = 5;
const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Discovery,
    Decision,
    Pattern,
    Error,
    ToolUsage,
}

impl KnowledgeKind {
    fn as_str(self) -> &'static str {
        match self {
            KnowledgeKind::Discovery => "discovery",
            KnowledgeKind::Decision => "decision",
            KnowledgeKind::Pattern => "pattern",
            KnowledgeKind::Error => "error",
            KnowledgeKind::ToolUsage => "tool_usage",
        }
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("quota exceeded for kind {kind:?}: more than {limit} records")]
    QuotaExceeded { kind: KnowledgeKind, limit: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub kind: KnowledgeKind,
    pub project: String,
    pub text: String,
    pub confidence: f32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecallHit {
    pub record_id: String,
    pub kind: KnowledgeKind,
    pub project: String,
    pub text: String,
    pub confidence: f32,
    pub score: f32,
}

/// Knowledge persisted alongside the raw embedding store. `meta` tracks the
/// fields the embedding store doesn't carry (kind, project, confidence) so
/// `recall` can filter after the similarity search runs.
pub struct KnowledgeStore {
    embeddings: EmbeddingStore,
    jsonl_dir: PathBuf,
    max_per_kind: usize,
    meta: HashMap<String, KnowledgeRecord>,
}

impl KnowledgeStore {
    pub fn new(embeddings: EmbeddingStore, jsonl_dir: impl Into<PathBuf>, max_per_kind: usize) -> Self {
        Self { embeddings, jsonl_dir: jsonl_dir.into(), max_per_kind, meta: HashMap::new() }
    }

    fn count_for_kind(&self, kind: KnowledgeKind) -> usize {
        self.meta.values().filter(|r| r.kind == kind).count()
    }

    /// Embed and persist a record, appending it to the kind's jsonl mirror.
    /// `QuotaExceeded` if the kind already holds `max_per_kind` records.
    pub fn write(
        &mut self,
        kind: KnowledgeKind,
        project: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
        confidence: f32,
    ) -> Result<KnowledgeRecord> {
        if self.count_for_kind(kind) >= self.max_per_kind {
            return Err(KnowledgeError::QuotaExceeded { kind, limit: self.max_per_kind });
        }

        let project = project.into();
        let text = text.into();
        let id = Uuid::new_v4().to_string();
        let record = KnowledgeRecord {
            id: id.clone(),
            kind,
            project: project.clone(),
            text: text.clone(),
            confidence,
            created_at: Utc::now().to_rfc3339(),
        };

        self.embeddings.store(EmbeddingRecord {
            id: id.clone(),
            source_type: SourceType::Knowledge,
            source_id: project.clone(),
            vector,
            text: text.clone(),
        })?;

        self.append_jsonl(&record)?;
        self.meta.insert(id, record.clone());
        Ok(record)
    }

    fn append_jsonl(&self, record: &KnowledgeRecord) -> Result<()> {
        let dir = self.jsonl_dir.join(record.kind.as_str());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.jsonl", record.project));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Search by similarity, then filter to the requested project/kinds.
    /// Over-fetches from the embedding store since the post-filter can drop
    /// hits the raw top-K search returned.
    pub fn recall(
        &self,
        query_vector: &[f32],
        project: Option<&str>,
        kinds: Option<&[KnowledgeKind]>,
        limit: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<RecallHit>> {
        let limit = limit.unwrap_or(DEFAULT_RECALL_LIMIT);
        let min_similarity = min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);
        let over_fetch = (limit * 4).max(20);

        let raw_hits = self.embeddings.search(query_vector, Some(SourceType::Knowledge), over_fetch, min_similarity)?;

        let mut hits = Vec::new();
        for hit in raw_hits {
            let Some(meta) = self.meta.get(&hit.record.id) else { continue };
            if let Some(project) = project {
                if meta.project != project {
                    continue;
                }
            }
            if let Some(kinds) = kinds {
                if !kinds.contains(&meta.kind) {
                    continue;
                }
            }
            hits.push(RecallHit {
                record_id: meta.id.clone(),
                kind: meta.kind,
                project: meta.project.clone(),
                text: meta.text.clone(),
                confidence: meta.confidence,
                score: hit.score,
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    /// Remove every record of `kind` with confidence below `threshold`.
    /// Returns the number of records pruned.
    pub fn prune_below_confidence(&mut self, kind: KnowledgeKind, threshold: f32) -> Result<usize> {
        let to_remove: Vec<String> = self
            .meta
            .values()
            .filter(|r| r.kind == kind && r.confidence < threshold)
            .map(|r| r.id.clone())
            .collect();

        for id in &to_remove {
            self.embeddings.delete(id)?;
            self.meta.remove(id);
        }
        Ok(to_remove.len())
    }

    pub fn jsonl_path(&self, kind: KnowledgeKind, project: &str) -> PathBuf {
        self.jsonl_dir.join(kind.as_str()).join(format!("{project}.jsonl"))
    }
}
