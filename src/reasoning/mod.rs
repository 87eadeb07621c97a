//! Explanation and confidence scoring engines.
//!
//! - [`BeliefGenerator`]: statements with evidence-count confidence
//! - [`ChainOfThought`]: linked reasoning steps with context snapshots
//! - [`UncertaintyHandler`]: weighted uncertainty over prediction probabilities
//! - [`ExplainabilityEngine`]: context influence, evidence, summaries and history
//! - [`ContextAnalyzer`]: input analysis and per-user context history
//! - [`FeedbackLearner`]: feedback scoring and context weights
//!
//! The engines are synchronous and own their state; the decision maker
//! composes them.

mod belief;
mod chain;
mod context;
mod explainability;
mod feedback;
mod uncertainty;

pub use belief::*;
pub use chain::*;
pub use context::*;
pub use explainability::*;
pub use feedback::*;
pub use uncertainty::*;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form context attached to decisions, thoughts and feedback.
pub type ContextMap = serde_json::Map<String, Value>;

/// How a single key differs between two maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueChange {
    /// Key only present in the newer map.
    Added(Value),
    /// Key only present in the older map.
    Removed(Value),
    /// Key present in both with different values.
    Changed { from: Value, to: Value },
}

/// Key-by-key difference between two maps. Equal values are omitted.
pub fn diff_maps<'a, I1, I2>(before: I1, after: I2) -> BTreeMap<String, ValueChange>
where
    I1: IntoIterator<Item = (&'a String, &'a Value)>,
    I2: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let before: BTreeMap<&String, &Value> = before.into_iter().collect();
    let after: BTreeMap<&String, &Value> = after.into_iter().collect();
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).copied().collect();

    let mut changes = BTreeMap::new();
    for key in keys {
        let change = match (before.get(key), after.get(key)) {
            (None, Some(v)) => ValueChange::Added((*v).clone()),
            (Some(v), None) => ValueChange::Removed((*v).clone()),
            (Some(a), Some(b)) if a != b => ValueChange::Changed {
                from: (*a).clone(),
                to: (*b).clone(),
            },
            _ => continue,
        };
        changes.insert(key.clone(), change);
    }
    changes
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Whether `word` appears in `text` as a whole word (case-insensitive).
pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    let lower = text.to_lowercase();
    if word.contains(' ') {
        let padded = format!(" {} ", lower.split_whitespace().collect::<Vec<_>>().join(" "));
        return padded.contains(&format!(" {} ", word));
    }
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|w| w == word)
}
