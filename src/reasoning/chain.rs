use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{diff_maps, mean, ContextMap, ValueChange};

/// A single reasoning step, optionally linked to the step before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    pub content: String,
    pub confidence: f64,
    pub context: ContextMap,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_thought_id: Option<String>,
}

/// Summary of a chain of thoughts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAnalysis {
    pub length: usize,
    pub average_confidence: f64,
    /// Context changes between consecutive thoughts, keyed `step_{n}`.
    pub context_evolution: BTreeMap<String, BTreeMap<String, ValueChange>>,
}

/// Append-only log of thoughts.
#[derive(Debug, Clone, Default)]
pub struct ChainOfThought {
    thoughts: Vec<Thought>,
}

impl ChainOfThought {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a thought and return its id.
    pub fn add_thought(
        &mut self,
        content: impl Into<String>,
        confidence: f64,
        context: ContextMap,
        previous_thought_id: Option<String>,
    ) -> String {
        let id = format!("thought_{}", &Uuid::new_v4().simple().to_string()[..8]);
        self.thoughts.push(Thought {
            id: id.clone(),
            content: content.into(),
            confidence,
            context,
            timestamp: Utc::now(),
            previous_thought_id,
        });
        id
    }

    /// All thoughts in insertion order, or the chain ending at `thought_id`
    /// ordered root-first.
    ///
    /// The walk stops at a dangling link or a revisited id.
    pub fn get_chain(&self, thought_id: Option<&str>) -> Vec<&Thought> {
        let Some(start) = thought_id else {
            return self.thoughts.iter().collect();
        };

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(thought) = self.find(id) else {
                break;
            };
            chain.push(thought);
            current = thought.previous_thought_id.as_deref();
        }

        chain.reverse();
        chain
    }

    /// Look up a thought by id.
    pub fn find(&self, thought_id: &str) -> Option<&Thought> {
        self.thoughts.iter().find(|t| t.id == thought_id)
    }

    /// Id of the most recently added thought.
    pub fn last_id(&self) -> Option<&str> {
        self.thoughts.last().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }
}

/// Length, mean confidence and context evolution of a chain.
pub fn analyze_chain(chain: &[&Thought]) -> ChainAnalysis {
    let confidences: Vec<f64> = chain.iter().map(|t| t.confidence).collect();

    let mut context_evolution = BTreeMap::new();
    for (i, pair) in chain.windows(2).enumerate() {
        let changes = diff_maps(&pair[0].context, &pair[1].context);
        if !changes.is_empty() {
            context_evolution.insert(format!("step_{}", i + 1), changes);
        }
    }

    ChainAnalysis {
        length: chain.len(),
        average_confidence: mean(&confidences),
        context_evolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: serde_json::Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_add_thought_id_format() {
        let mut chain = ChainOfThought::new();
        let id = chain.add_thought("Initial", 0.8, ContextMap::new(), None);

        assert!(id.starts_with("thought_"));
        assert_eq!(id.len(), "thought_".len() + 8);
        assert!(id["thought_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.last_id(), Some(id.as_str()));
    }

    #[test]
    fn test_get_chain_without_id_returns_all() {
        let mut chain = ChainOfThought::new();
        chain.add_thought("a", 0.5, ContextMap::new(), None);
        chain.add_thought("b", 0.5, ContextMap::new(), None);

        let all = chain.get_chain(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "a");
    }

    #[test]
    fn test_get_chain_walks_links_root_first() {
        let mut chain = ChainOfThought::new();
        let first = chain.add_thought("first", 0.8, ContextMap::new(), None);
        chain.add_thought("unrelated", 0.1, ContextMap::new(), None);
        let second = chain.add_thought("second", 0.85, ContextMap::new(), Some(first.clone()));
        let third = chain.add_thought("third", 0.9, ContextMap::new(), Some(second));

        let linked = chain.get_chain(Some(&third));
        let contents: Vec<_> = linked.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_get_chain_stops_at_dangling_link() {
        let mut chain = ChainOfThought::new();
        let id = chain.add_thought("orphan", 0.5, ContextMap::new(), Some("thought_missing".into()));

        assert_eq!(chain.get_chain(Some(&id)).len(), 1);
        assert!(chain.get_chain(Some("thought_unknown")).is_empty());
    }

    #[test]
    fn test_analyze_chain() {
        let mut chain = ChainOfThought::new();
        let a = chain.add_thought("a", 0.8, ctx(json!({"step": 1})), None);
        let b = chain.add_thought("b", 0.9, ctx(json!({"step": 2})), Some(a));
        let c = chain.add_thought("c", 1.0, ctx(json!({"step": 2})), Some(b));

        let analysis = analyze_chain(&chain.get_chain(Some(&c)));
        assert_eq!(analysis.length, 3);
        assert!((analysis.average_confidence - 0.9).abs() < 1e-9);
        assert_eq!(analysis.context_evolution.len(), 1);
        assert_eq!(
            analysis.context_evolution["step_1"]["step"],
            ValueChange::Changed {
                from: json!(1),
                to: json!(2)
            }
        );
    }

    #[test]
    fn test_analyze_empty_chain() {
        let analysis = analyze_chain(&[]);
        assert_eq!(analysis.length, 0);
        assert_eq!(analysis.average_confidence, 0.0);
        assert!(analysis.context_evolution.is_empty());
    }
}
