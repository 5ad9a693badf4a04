//! Keyword / file-pattern / error-name fallback matrix for the router.
//!
//! Used whenever the embedding index has no agent records or the embedding
//! provider is unreachable. A flat glob-to-regex conversion handles file
//! patterns since the stdlib has no glob matcher and pulling in a dedicated
//! crate for `*.rs`-style patterns alone isn't worth the dependency.

use std::collections::HashMap;

use regex::Regex;

/// One agent's registered match triggers.
#[derive(Debug, Clone)]
pub struct AgentMatcher {
    pub agent_id: String,
    pub keywords: Vec<String>,
    pub file_patterns: Vec<String>,
    pub error_names: Vec<String>,
}

const KEYWORD_SCORE: f32 = 0.8;

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut escaped = regex::escape(pattern);
    escaped = escaped.replace(r"\*", ".*").replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

/// Match `query` against the registered matchers and return deduplicated
/// `(agent_id, score)` pairs, highest score per agent kept.
pub fn keyword_match(query: &str, matchers: &[AgentMatcher]) -> Vec<(String, f32)> {
    let lowered = query.to_lowercase();
    let mut best: HashMap<String, f32> = HashMap::new();

    for matcher in matchers {
        let mut hit = matcher.keywords.iter().any(|kw| lowered.contains(&kw.to_lowercase()));

        if !hit {
            hit = matcher
                .error_names
                .iter()
                .any(|name| lowered.contains(&name.to_lowercase()));
        }

        if !hit {
            hit = matcher.file_patterns.iter().any(|pattern| {
                glob_to_regex(pattern).map(|re| re.is_match(query)).unwrap_or(false)
            });
        }

        if hit {
            let entry = best.entry(matcher.agent_id.clone()).or_insert(0.0);
            if KEYWORD_SCORE > *entry {
                *entry = KEYWORD_SCORE;
            }
        }
    }

    let mut hits: Vec<(String, f32)> = best.into_iter().collect();
    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    hits
}
