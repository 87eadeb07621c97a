use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ContextMap;

const DEFAULT_MAX_HISTORY: usize = 50;

const POSITIVE_WORDS: [&str; 10] = [
    "good", "great", "excellent", "positive", "gain", "growth", "profit", "success", "benefit",
    "up",
];
const NEGATIVE_WORDS: [&str; 10] = [
    "bad", "poor", "negative", "loss", "risk", "decline", "fail", "problem", "down", "drop",
];
const DECISION_KEYWORDS: [&str; 9] = [
    "should", "must", "need", "will", "recommend", "decide", "because", "important", "consider",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// What the analyzer extracted from a piece of input text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAnalysis {
    pub entities: Vec<String>,
    pub sentiment: Sentiment,
    pub key_points: Vec<String>,
}

impl InputAnalysis {
    fn to_value(&self) -> Value {
        json!({
            "entities": self.entities,
            "sentiment": self.sentiment.as_str(),
            "key_points": self.key_points,
        })
    }
}

/// Extracts context from input text and keeps a bounded per-user history.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    max_history: usize,
    history: HashMap<String, VecDeque<ContextMap>>,
}

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ContextAnalyzer {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            history: HashMap::new(),
        }
    }

    /// Entities, keyword sentiment and decision-bearing sentences.
    pub fn analyze_input(&self, text: &str) -> InputAnalysis {
        let mut entities = Vec::new();
        let mut seen = HashSet::new();
        let mut key_points = Vec::new();
        let (mut positive, mut negative) = (0usize, 0usize);

        for sentence in split_sentences(text) {
            let words: Vec<&str> = sentence
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|w| !w.is_empty())
                .collect();

            for word in words.iter().skip(1) {
                if word.chars().next().is_some_and(char::is_uppercase) && seen.insert(*word) {
                    entities.push(word.to_string());
                }
            }

            let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
            positive += lower.iter().filter(|w| POSITIVE_WORDS.contains(&w.as_str())).count();
            negative += lower.iter().filter(|w| NEGATIVE_WORDS.contains(&w.as_str())).count();

            if lower.iter().any(|w| DECISION_KEYWORDS.contains(&w.as_str())) {
                key_points.push(sentence.to_string());
            }
        }

        let sentiment = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };

        InputAnalysis {
            entities,
            sentiment,
            key_points,
        }
    }

    /// Shallow merge; keys in `new` win.
    pub fn merge_contexts(&self, old: &ContextMap, new: &ContextMap) -> ContextMap {
        let mut merged = old.clone();
        merged.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Enrich `context` with an `input_analysis` entry and record it for the user.
    pub fn analyze(&mut self, user_id: &str, input: &str, context: &ContextMap) -> ContextMap {
        let mut enriched = context.clone();
        enriched.insert(
            "input_analysis".to_string(),
            self.analyze_input(input).to_value(),
        );

        let history = self.history.entry(user_id.to_string()).or_default();
        history.push_back(enriched.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }

        enriched
    }

    /// Past contexts sharing at least one key/value pair with `current`,
    /// most recent first.
    pub fn get_relevant_history(&self, user_id: &str, current: &ContextMap) -> Vec<ContextMap> {
        let Some(history) = self.history.get(user_id) else {
            return Vec::new();
        };

        history
            .iter()
            .rev()
            .filter(|past| current.iter().any(|(k, v)| past.get(k) == Some(v)))
            .cloned()
            .collect()
    }

    /// Number of contexts recorded for a user.
    pub fn history_len(&self, user_id: &str) -> usize {
        self.history.get(user_id).map_or(0, VecDeque::len)
    }
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entities_skip_sentence_start() {
        let analyzer = ContextAnalyzer::default();
        let analysis =
            analyzer.analyze_input("Should we buy Apple stock? Analysts at Goldman like Apple.");

        assert_eq!(analysis.entities, vec!["Apple", "Goldman"]);
    }

    #[test]
    fn test_sentiment() {
        let analyzer = ContextAnalyzer::default();
        assert_eq!(
            analyzer.analyze_input("Great growth and strong profit").sentiment,
            Sentiment::Positive
        );
        assert_eq!(
            analyzer.analyze_input("High risk of loss").sentiment,
            Sentiment::Negative
        );
        assert_eq!(
            analyzer.analyze_input("The meeting is at noon").sentiment,
            Sentiment::Neutral
        );
    }

    #[test]
    fn test_key_points() {
        let analyzer = ContextAnalyzer::default();
        let analysis = analyzer.analyze_input("Rates are flat. We should refinance now! Nice day.");
        assert_eq!(analysis.key_points, vec!["We should refinance now"]);
    }

    #[test]
    fn test_merge_contexts_prefers_new() {
        let analyzer = ContextAnalyzer::default();
        let merged = analyzer.merge_contexts(
            &ctx(json!({"a": 1, "b": 2})),
            &ctx(json!({"b": 3, "c": 4})),
        );
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_analyze_adds_input_analysis() {
        let mut analyzer = ContextAnalyzer::default();
        let enriched = analyzer.analyze("alice", "Is Tesla a good buy?", &ctx(json!({"budget": 100})));

        assert_eq!(enriched["budget"], json!(100));
        assert_eq!(enriched["input_analysis"]["sentiment"], json!("positive"));
        assert_eq!(enriched["input_analysis"]["entities"], json!(["Tesla"]));
        assert_eq!(analyzer.history_len("alice"), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut analyzer = ContextAnalyzer::new(2);
        for i in 0..5 {
            analyzer.analyze("bob", "input", &ctx(json!({ "i": i })));
        }
        assert_eq!(analyzer.history_len("bob"), 2);
        assert_eq!(analyzer.history_len("nobody"), 0);
    }

    #[test]
    fn test_relevant_history_most_recent_first() {
        let mut analyzer = ContextAnalyzer::default();
        analyzer.analyze("carol", "x", &ctx(json!({"market": "bull", "n": 1})));
        analyzer.analyze("carol", "x", &ctx(json!({"market": "bear", "n": 2})));
        analyzer.analyze("carol", "x", &ctx(json!({"market": "bull", "n": 3})));

        let relevant = analyzer.get_relevant_history("carol", &ctx(json!({"market": "bull"})));
        let ns: Vec<_> = relevant.iter().map(|c| c["n"].clone()).collect();
        assert_eq!(ns, vec![json!(3), json!(1)]);

        assert!(analyzer
            .get_relevant_history("dave", &ctx(json!({"market": "bull"})))
            .is_empty());
    }
}
