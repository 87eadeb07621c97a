use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::ContextMap;

const BASE_CONFIDENCE: f64 = 0.5;
const EVIDENCE_WEIGHT: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.95;

/// A statement the agent holds, scored by how much evidence backs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    pub statement: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Creates and maintains beliefs above a confidence threshold.
#[derive(Debug, Clone)]
pub struct BeliefGenerator {
    confidence_threshold: f64,
    beliefs: Vec<Belief>,
}

impl Default for BeliefGenerator {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl BeliefGenerator {
    /// Create a generator that retains beliefs at or above `confidence_threshold`.
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            beliefs: Vec::new(),
        }
    }

    /// Configured retention threshold.
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Form a belief from an input statement and its evidence.
    ///
    /// The belief is always returned but only retained when its confidence
    /// reaches the threshold.
    pub fn generate_belief(
        &mut self,
        input: &str,
        context: &ContextMap,
        evidence: Vec<String>,
    ) -> Belief {
        let belief = Belief {
            statement: input.to_string(),
            confidence: calculate_confidence(&evidence),
            evidence,
            timestamp: Utc::now(),
            source: "agent".to_string(),
            metadata: Some(json!({ "context": context })),
        };

        if belief.confidence >= self.confidence_threshold {
            self.beliefs.push(belief.clone());
        } else {
            debug!(
                confidence = belief.confidence,
                threshold = self.confidence_threshold,
                "Belief below threshold, not retained"
            );
        }

        belief
    }

    /// Add evidence to a retained belief, matched case-insensitively.
    ///
    /// The updated belief replaces the old one at the end of the list.
    pub fn update_belief(&mut self, statement: &str, new_evidence: Vec<String>) -> Option<Belief> {
        let idx = self.find_index(statement)?;
        let existing = self.beliefs.remove(idx);

        let mut evidence = existing.evidence;
        evidence.extend(new_evidence);

        let updated = Belief {
            statement: statement.to_string(),
            confidence: calculate_confidence(&evidence),
            evidence,
            timestamp: Utc::now(),
            source: existing.source,
            metadata: existing.metadata,
        };

        self.beliefs.push(updated.clone());
        Some(updated)
    }

    /// Retained beliefs with confidence at or above `min_confidence`
    /// (default: the generator's threshold).
    pub fn get_beliefs(&self, min_confidence: Option<f64>) -> Vec<&Belief> {
        let min = min_confidence.unwrap_or(self.confidence_threshold);
        self.beliefs.iter().filter(|b| b.confidence >= min).collect()
    }

    /// Forget a belief.
    pub fn remove_belief(&mut self, statement: &str) -> Option<Belief> {
        let idx = self.find_index(statement)?;
        Some(self.beliefs.remove(idx))
    }

    /// Number of retained beliefs.
    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    /// Whether no beliefs are retained.
    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    fn find_index(&self, statement: &str) -> Option<usize> {
        let needle = statement.to_lowercase();
        self.beliefs
            .iter()
            .position(|b| b.statement.to_lowercase() == needle)
    }
}

/// Confidence from evidence count: 0.5 + 0.1 per item, capped at 0.95.
pub fn calculate_confidence(evidence: &[String]) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    (BASE_CONFIDENCE + evidence.len() as f64 * EVIDENCE_WEIGHT).min(MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_confidence_from_evidence_count() {
        assert_eq!(calculate_confidence(&[]), 0.0);
        assert!((calculate_confidence(&ev(&["a"])) - 0.6).abs() < 1e-9);
        assert!((calculate_confidence(&ev(&["a", "b", "c"])) - 0.8).abs() < 1e-9);
        assert_eq!(calculate_confidence(&ev(&["a"; 10])), 0.95);
    }

    #[test]
    fn test_generate_belief_retained_above_threshold() {
        let mut gen = BeliefGenerator::new(0.7);
        let belief = gen.generate_belief("Sky is blue", &ContextMap::new(), ev(&["a", "b"]));

        assert_eq!(belief.source, "agent");
        assert!((belief.confidence - 0.7).abs() < 1e-9);
        assert_eq!(gen.len(), 1);
        assert_eq!(belief.metadata.unwrap()["context"], json!({}));
    }

    #[test]
    fn test_generate_belief_below_threshold_not_retained() {
        let mut gen = BeliefGenerator::new(0.7);
        let belief = gen.generate_belief("Maybe", &ContextMap::new(), ev(&["a"]));

        assert!((belief.confidence - 0.6).abs() < 1e-9);
        assert!(gen.is_empty());
    }

    #[test]
    fn test_generate_belief_without_evidence() {
        let mut gen = BeliefGenerator::default();
        let belief = gen.generate_belief("Unfounded", &ContextMap::new(), vec![]);
        assert_eq!(belief.confidence, 0.0);
        assert!(gen.is_empty());
    }

    #[test]
    fn test_update_belief_case_insensitive() {
        let mut gen = BeliefGenerator::new(0.7);
        let original = gen.generate_belief("Market is up", &ContextMap::new(), ev(&["a", "b"]));

        let updated = gen.update_belief("MARKET IS UP", ev(&["c"])).unwrap();
        assert_eq!(updated.evidence, ev(&["a", "b", "c"]));
        assert!((updated.confidence - 0.8).abs() < 1e-9);
        assert_eq!(updated.source, original.source);
        assert_eq!(updated.metadata, original.metadata);
        assert_eq!(gen.len(), 1);
    }

    #[test]
    fn test_update_moves_belief_to_end() {
        let mut gen = BeliefGenerator::new(0.5);
        gen.generate_belief("first", &ContextMap::new(), ev(&["a"]));
        gen.generate_belief("second", &ContextMap::new(), ev(&["a"]));

        gen.update_belief("first", ev(&["b"]));
        let beliefs = gen.get_beliefs(Some(0.0));
        assert_eq!(beliefs[0].statement, "second");
        assert_eq!(beliefs[1].statement, "first");
    }

    #[test]
    fn test_update_unknown_belief() {
        let mut gen = BeliefGenerator::default();
        assert!(gen.update_belief("nothing", ev(&["a"])).is_none());
    }

    #[test]
    fn test_get_beliefs_filters_by_confidence() {
        let mut gen = BeliefGenerator::new(0.6);
        gen.generate_belief("weak", &ContextMap::new(), ev(&["a"]));
        gen.generate_belief("strong", &ContextMap::new(), ev(&["a", "b", "c", "d"]));

        assert_eq!(gen.get_beliefs(None).len(), 2);
        let strong = gen.get_beliefs(Some(0.85));
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].statement, "strong");
    }

    #[test]
    fn test_remove_belief() {
        let mut gen = BeliefGenerator::new(0.5);
        gen.generate_belief("gone soon", &ContextMap::new(), ev(&["a"]));
        assert!(gen.remove_belief("Gone Soon").is_some());
        assert!(gen.is_empty());
        assert!(gen.remove_belief("gone soon").is_none());
    }
}
