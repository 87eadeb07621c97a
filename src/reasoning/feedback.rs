use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{mean, variance, ContextMap};

const POSITIVE_WORDS: [&str; 5] = ["good", "great", "excellent", "perfect", "helpful"];
const NEGATIVE_WORDS: [&str; 5] = ["bad", "poor", "wrong", "unhelpful", "incorrect"];
const INITIAL_WEIGHT: f64 = 0.5;
const PERFORMANCE_WINDOW: usize = 100;

/// User feedback on a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feedback {
    /// Explicitly scored feedback; the score is used as-is.
    Scored { text: String, score: f64 },
    /// Free text, scored by keyword.
    Text(String),
}

impl Feedback {
    pub fn text(&self) -> &str {
        match self {
            Feedback::Text(text) | Feedback::Scored { text, .. } => text,
        }
    }
}

impl From<&str> for Feedback {
    fn from(text: &str) -> Self {
        Feedback::Text(text.to_string())
    }
}

impl From<String> for Feedback {
    fn from(text: String) -> Self {
        Feedback::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub feedback: String,
    pub score: f64,
    pub context: ContextMap,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Score statistics over recent feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub score: f64,
    pub confidence: f64,
    pub sample_size: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub score: f64,
    pub performance: Performance,
    /// Number of context weights tracked after the update.
    pub weights_updated: usize,
}

/// Learns per-context-value weights from feedback scores.
#[derive(Debug, Clone)]
pub struct FeedbackLearner {
    learning_rate: f64,
    feedback_history: Vec<FeedbackEntry>,
    context_weights: BTreeMap<String, f64>,
    performance_history: Vec<Performance>,
}

impl Default for FeedbackLearner {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl FeedbackLearner {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            feedback_history: Vec::new(),
            context_weights: BTreeMap::new(),
            performance_history: Vec::new(),
        }
    }

    /// Score the feedback, move the weights of every context value toward
    /// it and record current performance.
    pub fn process_feedback(
        &mut self,
        feedback: Feedback,
        context: &ContextMap,
        metadata: Option<Value>,
    ) -> FeedbackOutcome {
        let score = match &feedback {
            Feedback::Scored { score, .. } => *score,
            Feedback::Text(text) => score_text(text),
        };

        for (key, value) in context {
            let weight = self
                .context_weights
                .entry(weight_key(key, value))
                .or_insert(INITIAL_WEIGHT);
            *weight += self.learning_rate * (score - *weight);
        }

        self.feedback_history.push(FeedbackEntry {
            feedback: feedback.text().to_string(),
            score,
            context: context.clone(),
            timestamp: Utc::now(),
            metadata,
        });

        let performance = self.evaluate_performance();
        self.performance_history.push(performance.clone());

        debug!(
            score,
            weights = self.context_weights.len(),
            "Feedback processed"
        );

        FeedbackOutcome {
            score,
            performance,
            weights_updated: self.context_weights.len(),
        }
    }

    /// Mean weight of all values seen for a context key, 0.5 if none.
    pub fn get_context_importance(&self, context_key: &str) -> f64 {
        let prefix = format!("{context_key}:");
        let weights: Vec<f64> = self
            .context_weights
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, w)| *w)
            .collect();

        if weights.is_empty() {
            INITIAL_WEIGHT
        } else {
            mean(&weights)
        }
    }

    pub fn context_weights(&self) -> &BTreeMap<String, f64> {
        &self.context_weights
    }

    pub fn feedback_history(&self) -> &[FeedbackEntry] {
        &self.feedback_history
    }

    pub fn performance_history(&self) -> &[Performance] {
        &self.performance_history
    }

    fn evaluate_performance(&self) -> Performance {
        let start = self.feedback_history.len().saturating_sub(PERFORMANCE_WINDOW);
        let scores: Vec<f64> = self.feedback_history[start..]
            .iter()
            .map(|e| e.score)
            .collect();

        Performance {
            score: mean(&scores),
            confidence: if scores.is_empty() {
                0.0
            } else {
                1.0 - variance(&scores).sqrt()
            },
            sample_size: scores.len(),
            timestamp: Utc::now(),
        }
    }
}

/// Share of positive keywords among sentiment keywords, 0.5 when none appear.
pub fn score_text(feedback: &str) -> f64 {
    let lower = feedback.to_lowercase();
    let words: HashSet<&str> = lower.split_whitespace().collect();
    let positive = POSITIVE_WORDS.iter().filter(|w| words.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| words.contains(*w)).count();

    if positive + negative == 0 {
        return 0.5;
    }
    positive as f64 / (positive + negative) as f64
}

fn weight_key(key: &str, value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{key}:{n}"),
        Value::Bool(b) => format!("{key}:{b}"),
        Value::String(_) => format!("{key}:str"),
        Value::Array(_) => format!("{key}:list"),
        Value::Object(_) => format!("{key}:dict"),
        Value::Null => format!("{key}:null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_score_text() {
        assert_eq!(score_text("great and helpful"), 1.0);
        assert_eq!(score_text("wrong answer"), 0.0);
        assert_eq!(score_text("good but wrong"), 0.5);
        assert_eq!(score_text("no opinion"), 0.5);
        assert!((score_text("Good good great bad") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_weight_keys() {
        assert_eq!(weight_key("risk", &json!(3)), "risk:3");
        assert_eq!(weight_key("active", &json!(true)), "active:true");
        assert_eq!(weight_key("name", &json!("x")), "name:str");
        assert_eq!(weight_key("tags", &json!([])), "tags:list");
        assert_eq!(weight_key("meta", &json!({"a": 1})), "meta:dict");
        assert_eq!(weight_key("gone", &Value::Null), "gone:null");
    }

    #[test]
    fn test_process_text_feedback_updates_weights() {
        let mut learner = FeedbackLearner::new(0.1);
        let outcome = learner.process_feedback(
            Feedback::from("excellent"),
            &ctx(json!({"risk": 3, "name": "plan"})),
            None,
        );

        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.weights_updated, 2);
        // 0.5 + 0.1 * (1.0 - 0.5)
        assert!((learner.context_weights()["risk:3"] - 0.55).abs() < 1e-12);
        assert_eq!(learner.feedback_history().len(), 1);
        assert_eq!(learner.performance_history().len(), 1);
    }

    #[test]
    fn test_scored_feedback_uses_given_score() {
        let mut learner = FeedbackLearner::default();
        let outcome = learner.process_feedback(
            Feedback::Scored {
                text: "bad".to_string(),
                score: 0.9,
            },
            &ContextMap::new(),
            Some(json!({"source": "survey"})),
        );

        assert_eq!(outcome.score, 0.9);
        assert_eq!(learner.feedback_history()[0].feedback, "bad");
        assert_eq!(learner.feedback_history()[0].metadata, Some(json!({"source": "survey"})));
    }

    #[test]
    fn test_performance() {
        let mut learner = FeedbackLearner::default();
        learner.process_feedback(Feedback::from("great"), &ContextMap::new(), None);
        let outcome = learner.process_feedback(Feedback::from("wrong"), &ContextMap::new(), None);

        let perf = outcome.performance;
        assert_eq!(perf.sample_size, 2);
        assert!((perf.score - 0.5).abs() < 1e-12);
        assert!((perf.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_performance_window() {
        let mut learner = FeedbackLearner::default();
        for _ in 0..105 {
            learner.process_feedback(Feedback::from("perfect"), &ContextMap::new(), None);
        }
        let perf = learner.performance_history().last().unwrap();
        assert_eq!(perf.sample_size, 100);
        assert_eq!(perf.confidence, 1.0);
    }

    #[test]
    fn test_context_importance() {
        let mut learner = FeedbackLearner::new(0.5);
        learner.process_feedback(Feedback::from("great"), &ctx(json!({"risk": 1})), None);
        learner.process_feedback(Feedback::from("wrong"), &ctx(json!({"risk": 2})), None);

        // risk:1 -> 0.75, risk:2 -> 0.25
        assert!((learner.get_context_importance("risk") - 0.5).abs() < 1e-12);
        assert!((learner.context_weights()["risk:1"] - 0.75).abs() < 1e-12);
        assert_eq!(learner.get_context_importance("unknown"), 0.5);
    }

    #[test]
    fn test_feedback_deserializes_both_shapes() {
        let scored: Feedback = serde_json::from_value(json!({"text": "ok", "score": 0.3})).unwrap();
        assert_eq!(scored.text(), "ok");
        let text: Feedback = serde_json::from_value(json!("fine")).unwrap();
        assert_eq!(text, Feedback::Text("fine".to_string()));
    }
}
