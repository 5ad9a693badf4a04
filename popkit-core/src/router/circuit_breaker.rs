//! Circuit breaker for the remote embedding provider.
//!
//! Tracks consecutive failures. When the failure threshold is crossed the
//! circuit opens and callers should not retry — they fall straight to the
//! keyword fallback (§4.D) instead of blocking on a dead network call.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-key circuit breaker. The router uses a single fixed key for the
/// embedding provider; the struct stays keyed by `String` so other remote
/// calls (the pub/sub remote backend) can share the type.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_failures: HashMap<String, u32>,
    last_failure_secs: HashMap<String, u64>,
    failure_threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: HashMap::new(),
            last_failure_secs: HashMap::new(),
            failure_threshold,
            cooldown_secs,
        }
    }

    pub fn record_success(&mut self, key: &str) {
        self.consecutive_failures.remove(key);
        self.last_failure_secs.remove(key);
    }

    pub fn record_failure(&mut self, key: &str) {
        let count = self.consecutive_failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        self.last_failure_secs.insert(key.to_string(), unix_now());
    }

    pub fn state(&self, key: &str) -> CircuitState {
        let failures = self.consecutive_failures.get(key).copied().unwrap_or(0);
        if failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        match self.last_failure_secs.get(key) {
            Some(last) if unix_now().saturating_sub(*last) >= self.cooldown_secs => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }

    pub fn is_available(&self, key: &str) -> bool {
        !matches!(self.state(key), CircuitState::Open)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_by_default() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state("embedding"), CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new(2, 30);
        breaker.record_failure("embedding");
        assert_eq!(breaker.state("embedding"), CircuitState::Closed);
        breaker.record_failure("embedding");
        assert_eq!(breaker.state("embedding"), CircuitState::Open);
        assert!(!breaker.is_available("embedding"));
    }

    #[test]
    fn success_resets_circuit() {
        let mut breaker = CircuitBreaker::new(1, 30);
        breaker.record_failure("embedding");
        assert_eq!(breaker.state("embedding"), CircuitState::Open);
        breaker.record_success("embedding");
        assert_eq!(breaker.state("embedding"), CircuitState::Closed);
    }
}
