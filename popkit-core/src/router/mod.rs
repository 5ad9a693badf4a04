//! Semantic Router — picks the agent best suited to handle a free-text query.
//!
//! Embedding search is tried first; any failure (no provider configured, no
//! agent records indexed yet, network error) falls through to the
//! keyword/file-pattern/error-name matrix. Routing decisions are never
//! cached across sessions — every call re-embeds or re-matches from scratch.

pub mod circuit_breaker;
pub mod fallback;
pub mod provider;

use tracing::warn;

use crate::embedding::{EmbeddingStore, SourceType};
use circuit_breaker::CircuitBreaker;
use fallback::AgentMatcher;
use provider::EmbeddingProvider;

const DEFAULT_MIN_CONFIDENCE: f32 = 0.6;
const EMBEDDING_PROVIDER_KEY: &str = "embedding-provider";

#[derive(Debug, Clone, PartialEq)]
pub struct RouteHit {
    pub agent_id: String,
    pub score: f32,
    pub reason: String,
}

/// Routes queries to agents. Holds no per-session cache by design: `route`
/// re-derives its answer on every call.
pub struct SemanticRouter {
    provider: Option<EmbeddingProvider>,
    breaker: CircuitBreaker,
    matchers: Vec<AgentMatcher>,
    default_agent: String,
}

impl SemanticRouter {
    pub fn new(provider: Option<EmbeddingProvider>, matchers: Vec<AgentMatcher>, default_agent: impl Into<String>) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::default(),
            matchers,
            default_agent: default_agent.into(),
        }
    }

    pub async fn route(
        &mut self,
        store: &EmbeddingStore,
        query: &str,
        top_k: usize,
        min_confidence: Option<f32>,
    ) -> Vec<RouteHit> {
        let min_confidence = min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);

        if let Some(hits) = self.try_embedding_route(store, query, top_k, min_confidence).await {
            if !hits.is_empty() {
                return hits;
            }
        }

        let fallback_hits = fallback::keyword_match(query, &self.matchers);
        if !fallback_hits.is_empty() {
            return fallback_hits
                .into_iter()
                .take(top_k)
                .map(|(agent_id, score)| RouteHit { agent_id, score, reason: "keyword-match".to_string() })
                .collect();
        }

        vec![RouteHit { agent_id: self.default_agent.clone(), score: 0.0, reason: "fallback-default".to_string() }]
    }

    async fn try_embedding_route(
        &mut self,
        store: &EmbeddingStore,
        query: &str,
        top_k: usize,
        min_confidence: f32,
    ) -> Option<Vec<RouteHit>> {
        if store.count(Some(SourceType::Agent)).ok()? == 0 {
            return None;
        }
        if !self.breaker.is_available(EMBEDDING_PROVIDER_KEY) {
            return None;
        }
        let provider = self.provider.as_ref()?;

        match provider.embed_query(query).await {
            Ok(vector) => {
                self.breaker.record_success(EMBEDDING_PROVIDER_KEY);
                let hits = store.search(&vector, Some(SourceType::Agent), top_k, min_confidence).ok()?;
                Some(
                    hits.into_iter()
                        .map(|hit| RouteHit {
                            agent_id: hit.record.source_id,
                            score: hit.score,
                            reason: "embedding-match".to_string(),
                        })
                        .collect(),
                )
            }
            Err(err) => {
                self.breaker.record_failure(EMBEDDING_PROVIDER_KEY);
                warn!(component = "router", reason = %err, "embedding provider unavailable, falling back to keywords");
                None
            }
        }
    }
}
