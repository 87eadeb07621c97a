//! Decision explanations: evidence, context influence, summaries and history.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{contains_word, diff_maps, mean, ContextMap, Thought, ValueChange};
use crate::error::{AppError, AppResult};

#[cfg(test)]
#[path = "explainability_tests.rs"]
mod explainability_tests;

const IMPORTANT_KEYWORDS: [&str; 5] = ["priority", "critical", "essential", "key", "main"];
const KEY_FACTOR_COUNT: usize = 3;
const HIGH_CONFIDENCE_STEP: f64 = 0.8;

/// A reasoning step fed into an explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtStep {
    pub content: String,
    pub confidence: f64,
}

impl ThoughtStep {
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            confidence,
        }
    }
}

impl From<&Thought> for ThoughtStep {
    fn from(thought: &Thought) -> Self {
        Self::new(thought.content.clone(), thought.confidence)
    }
}

/// Kind of context factor, assigned from its key and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorCategory {
    Temporal,
    Numerical,
    State,
    User,
    General,
}

impl FactorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorCategory::Temporal => "temporal",
            FactorCategory::Numerical => "numerical",
            FactorCategory::State => "state",
            FactorCategory::User => "user",
            FactorCategory::General => "general",
        }
    }
}

impl fmt::Display for FactorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred shape of a decision text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Recommendation,
    Classification,
    Prediction,
    General,
}

impl DecisionType {
    /// Classify on whole words: recommendation, classification, prediction, in that order.
    pub fn infer(decision: &str) -> Self {
        let any = |words: &[&str]| words.iter().any(|w| contains_word(decision, w));
        if any(&["should", "must", "need"][..]) {
            DecisionType::Recommendation
        } else if any(&["is", "are", "was", "were"][..]) {
            DecisionType::Classification
        } else if any(&["will", "going to"][..]) {
            DecisionType::Prediction
        } else {
            DecisionType::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Recommendation => "recommendation",
            DecisionType::Classification => "classification",
            DecisionType::Prediction => "prediction",
            DecisionType::General => "general",
        }
    }
}

/// A context key and how much it weighed in a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFactor {
    pub name: String,
    pub value: Value,
    /// Normalized weight; all factors of one explanation sum to 1.
    pub influence_score: f64,
    pub confidence: f64,
    pub category: FactorCategory,
}

/// Evidence grouped by where it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub context_based: Vec<String>,
    pub reasoning_based: Vec<String>,
    pub confidence_based: Vec<String>,
}

impl Evidence {
    /// Evidence groups as (name, items) pairs.
    pub fn groups(&self) -> [(&'static str, &[String]); 3] {
        [
            ("context_based", self.context_based.as_slice()),
            ("reasoning_based", self.reasoning_based.as_slice()),
            ("confidence_based", self.confidence_based.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationMetadata {
    pub context_size: usize,
    pub chain_length: usize,
    pub decision_type: DecisionType,
}

impl ExplanationMetadata {
    fn as_map(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("context_size".into(), json!(self.context_size));
        map.insert("chain_length".into(), json!(self.chain_length));
        map.insert("decision_type".into(), json!(self.decision_type.as_str()));
        map
    }
}

/// Why a decision was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub decision_id: String,
    pub reasoning_steps: Vec<String>,
    pub evidence: Evidence,
    pub confidence: f64,
    pub metadata: ExplanationMetadata,
    pub timestamp: DateTime<Utc>,
    pub context_influence: BTreeMap<String, ContextFactor>,
    /// Names of the most influential factors, strongest first.
    pub key_factors: Vec<String>,
}

impl Explanation {
    /// Factors sorted by descending influence.
    pub fn ranked_factors(&self) -> Vec<&ContextFactor> {
        let mut factors: Vec<&ContextFactor> = self.context_influence.values().collect();
        factors.sort_by(|a, b| b.influence_score.total_cmp(&a.influence_score));
        factors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualizationFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFormat {
    #[default]
    Short,
    Medium,
    Long,
}

/// A factor present in both explanations with different contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModification {
    pub factor: String,
    pub old_value: ContextFactor,
    pub new_value: ContextFactor,
    pub influence_change: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorChanges {
    pub added: Vec<ContextFactor>,
    pub removed: Vec<ContextFactor>,
    pub modified: Vec<FactorModification>,
    pub unchanged: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub common: Vec<String>,
}

/// Differences from a first explanation to a second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationComparison {
    pub confidence_diff: f64,
    pub context_changes: FactorChanges,
    pub reasoning_changes: ReasoningChanges,
    pub metadata_changes: BTreeMap<String, ValueChange>,
    /// Seconds from the first explanation to the second.
    pub timestamp_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorFrequency {
    pub frequency: f64,
    pub avg_influence: f64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    NoData,
}

/// Confidence movement over explanations ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTrend {
    pub trend: Trend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub percentage: f64,
    pub count: usize,
    pub avg_influence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAnalysis {
    pub total_decisions: usize,
    pub average_confidence: f64,
    /// Factors seen in more than one explanation.
    pub common_factors: BTreeMap<String, FactorFrequency>,
    pub confidence_trend: ConfidenceTrend,
    pub category_distribution: BTreeMap<FactorCategory, CategoryStats>,
}

/// Generates and stores explanations for decisions.
#[derive(Debug, Clone, Default)]
pub struct ExplainabilityEngine {
    explanations: Vec<Explanation>,
    index: HashMap<String, usize>,
}

impl ExplainabilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an explanation and store it under a fresh id.
    pub fn generate_explanation(
        &mut self,
        decision: &str,
        context: &ContextMap,
        thought_chain: &[ThoughtStep],
        confidence: f64,
    ) -> Explanation {
        let now = Utc::now();
        let decision_id = format!(
            "exp_{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let context_influence = analyze_context_influence(context);
        let key_factors = top_factors(&context_influence, KEY_FACTOR_COUNT);

        let explanation = Explanation {
            decision_id: decision_id.clone(),
            reasoning_steps: thought_chain.iter().map(|t| t.content.clone()).collect(),
            evidence: collect_evidence(context, thought_chain),
            confidence,
            metadata: ExplanationMetadata {
                context_size: context.len(),
                chain_length: thought_chain.len(),
                decision_type: DecisionType::infer(decision),
            },
            timestamp: now,
            context_influence,
            key_factors,
        };

        debug!(
            decision_id = %decision_id,
            factors = explanation.context_influence.len(),
            decision_type = explanation.metadata.decision_type.as_str(),
            "Explanation generated"
        );

        self.index.insert(decision_id, self.explanations.len());
        self.explanations.push(explanation.clone());
        explanation
    }

    pub fn get_explanation(&self, decision_id: &str) -> Option<&Explanation> {
        self.index.get(decision_id).map(|&i| &self.explanations[i])
    }

    /// Stored explanations in creation order.
    pub fn explanations(&self) -> &[Explanation] {
        &self.explanations
    }

    pub fn len(&self) -> usize {
        self.explanations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.explanations.is_empty()
    }

    /// Render an explanation as pretty JSON or plain text.
    pub fn visualize_explanation(&self, decision_id: &str, format: VisualizationFormat) -> String {
        let Some(explanation) = self.get_explanation(decision_id) else {
            return "Explanation not found.".to_string();
        };

        match format {
            VisualizationFormat::Json => json_visualization(explanation),
            VisualizationFormat::Text => text_visualization(explanation),
        }
    }

    /// Compare two stored explanations, `first` being the baseline.
    pub fn compare_explanations(
        &self,
        first_id: &str,
        second_id: &str,
    ) -> AppResult<ExplanationComparison> {
        let first = self
            .get_explanation(first_id)
            .ok_or_else(|| AppError::not_found("Explanation", first_id))?;
        let second = self
            .get_explanation(second_id)
            .ok_or_else(|| AppError::not_found("Explanation", second_id))?;

        Ok(ExplanationComparison {
            confidence_diff: second.confidence - first.confidence,
            context_changes: compare_factors(&first.context_influence, &second.context_influence),
            reasoning_changes: compare_steps(&first.reasoning_steps, &second.reasoning_steps),
            metadata_changes: diff_maps(&first.metadata.as_map(), &second.metadata.as_map()),
            timestamp_diff: (second.timestamp - first.timestamp).num_microseconds().unwrap_or(0)
                as f64
                / 1_000_000.0,
        })
    }

    pub fn summarize_explanation(&self, decision_id: &str, format: SummaryFormat) -> String {
        let Some(explanation) = self.get_explanation(decision_id) else {
            return "Explanation not found".to_string();
        };

        match format {
            SummaryFormat::Short => short_summary(explanation),
            SummaryFormat::Medium => medium_summary(explanation),
            SummaryFormat::Long => long_summary(explanation),
        }
    }

    /// Aggregate statistics over explanations, optionally only those newer
    /// than `time_window`.
    pub fn get_historical_analysis(&self, time_window: Option<Duration>) -> HistoricalAnalysis {
        let explanations: Vec<&Explanation> = match time_window {
            // A window reaching past the earliest representable time keeps everything.
            Some(window) => match Utc::now().checked_sub_signed(window) {
                Some(cutoff) => self
                    .explanations
                    .iter()
                    .filter(|e| e.timestamp >= cutoff)
                    .collect(),
                None => self.explanations.iter().collect(),
            },
            None => self.explanations.iter().collect(),
        };

        let confidences: Vec<f64> = explanations.iter().map(|e| e.confidence).collect();

        HistoricalAnalysis {
            total_decisions: explanations.len(),
            average_confidence: mean(&confidences),
            common_factors: common_factors(&explanations),
            confidence_trend: confidence_trend(&explanations),
            category_distribution: category_distribution(&explanations),
        }
    }
}

fn collect_evidence(context: &ContextMap, thought_chain: &[ThoughtStep]) -> Evidence {
    let mut evidence = Evidence::default();

    for (key, value) in context {
        match value {
            Value::String(s) => evidence.context_based.push(format!("{key}: {s}")),
            Value::Number(n) => evidence.context_based.push(format!("{key}: {n}")),
            Value::Bool(b) => evidence.context_based.push(format!("{key}: {b}")),
            _ => {}
        }
    }

    evidence.reasoning_based = thought_chain
        .iter()
        .filter(|t| t.confidence > HIGH_CONFIDENCE_STEP)
        .map(|t| t.content.clone())
        .collect();

    if !thought_chain.is_empty() {
        let confidences: Vec<f64> = thought_chain.iter().map(|t| t.confidence).collect();
        evidence
            .confidence_based
            .push(format!("Average confidence: {:.2}", mean(&confidences)));
    }

    evidence
}

fn analyze_context_influence(context: &ContextMap) -> BTreeMap<String, ContextFactor> {
    let mut factors: BTreeMap<String, ContextFactor> = context
        .iter()
        .map(|(key, value)| {
            let factor = ContextFactor {
                name: key.clone(),
                value: value.clone(),
                influence_score: factor_weight(key, value),
                confidence: factor_confidence(value),
                category: categorize_factor(key, value),
            };
            (key.clone(), factor)
        })
        .collect();

    let total: f64 = factors.values().map(|f| f.influence_score).sum();
    if total > 0.0 {
        for factor in factors.values_mut() {
            factor.influence_score /= total;
        }
    }

    factors
}

fn factor_weight(key: &str, value: &Value) -> f64 {
    let mut weight = match value {
        Value::Number(_) => 1.2,
        Value::Bool(_) => 1.1,
        Value::Object(_) => 1.3,
        _ => 1.0,
    };

    let key = key.to_lowercase();
    if IMPORTANT_KEYWORDS.iter().any(|k| key.contains(k)) {
        weight *= 1.5;
    }
    weight
}

fn factor_confidence(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Number(_) | Value::Bool(_) => 1.0,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                (trimmed.chars().count() as f64 / 100.0).min(1.0)
            }
        }
        Value::Object(map) => (map.len() as f64 / 5.0).min(1.0),
        Value::Array(items) => (items.len() as f64 / 10.0).min(1.0),
    }
}

fn categorize_factor(key: &str, value: &Value) -> FactorCategory {
    let key = key.to_lowercase();
    let key_has = |words: &[&str]| words.iter().any(|w| key.contains(w));

    if key_has(&["time", "date", "duration", "period"][..]) {
        FactorCategory::Temporal
    } else if value.is_number() {
        FactorCategory::Numerical
    } else if key_has(&["status", "state", "condition"][..]) {
        FactorCategory::State
    } else if key_has(&["user", "person", "client"][..]) {
        FactorCategory::User
    } else {
        FactorCategory::General
    }
}

fn top_factors(factors: &BTreeMap<String, ContextFactor>, n: usize) -> Vec<String> {
    let mut ranked: Vec<&ContextFactor> = factors.values().collect();
    ranked.sort_by(|a, b| b.influence_score.total_cmp(&a.influence_score));
    ranked.into_iter().take(n).map(|f| f.name.clone()).collect()
}

fn compare_factors(
    before: &BTreeMap<String, ContextFactor>,
    after: &BTreeMap<String, ContextFactor>,
) -> FactorChanges {
    let mut changes = FactorChanges::default();

    for (name, old) in before {
        match after.get(name) {
            None => changes.removed.push(old.clone()),
            Some(new) if new != old => changes.modified.push(FactorModification {
                factor: name.clone(),
                old_value: old.clone(),
                new_value: new.clone(),
                influence_change: new.influence_score - old.influence_score,
            }),
            Some(_) => changes.unchanged.push(name.clone()),
        }
    }
    changes.added = after
        .iter()
        .filter(|(name, _)| !before.contains_key(*name))
        .map(|(_, factor)| factor.clone())
        .collect();

    changes
}

fn compare_steps(before: &[String], after: &[String]) -> ReasoningChanges {
    ReasoningChanges {
        added: after.iter().filter(|s| !before.contains(s)).cloned().collect(),
        removed: before.iter().filter(|s| !after.contains(s)).cloned().collect(),
        common: before.iter().filter(|s| after.contains(s)).cloned().collect(),
    }
}

fn common_factors(explanations: &[&Explanation]) -> BTreeMap<String, FactorFrequency> {
    let mut influences: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for explanation in explanations {
        for factor in explanation.context_influence.values() {
            influences
                .entry(factor.name.as_str())
                .or_default()
                .push(factor.influence_score);
        }
    }

    let total = explanations.len() as f64;
    influences
        .into_iter()
        .filter(|(_, scores)| scores.len() > 1)
        .map(|(name, scores)| {
            (
                name.to_string(),
                FactorFrequency {
                    frequency: scores.len() as f64 / total,
                    avg_influence: mean(&scores),
                    occurrences: scores.len(),
                },
            )
        })
        .collect()
}

fn confidence_trend(explanations: &[&Explanation]) -> ConfidenceTrend {
    let mut ordered = explanations.to_vec();
    ordered.sort_by_key(|e| e.timestamp);
    let confidences: Vec<f64> = ordered.iter().map(|e| e.confidence).collect();

    let (Some(&start), Some(&end)) = (confidences.first(), confidences.last()) else {
        return ConfidenceTrend {
            trend: Trend::NoData,
            start: None,
            end: None,
            min: None,
            max: None,
        };
    };

    ConfidenceTrend {
        trend: if end > start {
            Trend::Increasing
        } else {
            Trend::Decreasing
        },
        start: Some(start),
        end: Some(end),
        min: Some(confidences.iter().copied().fold(f64::INFINITY, f64::min)),
        max: Some(confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}

fn category_distribution(explanations: &[&Explanation]) -> BTreeMap<FactorCategory, CategoryStats> {
    let mut influences: BTreeMap<FactorCategory, Vec<f64>> = BTreeMap::new();
    for explanation in explanations {
        for factor in explanation.context_influence.values() {
            influences
                .entry(factor.category)
                .or_default()
                .push(factor.influence_score);
        }
    }

    let total: usize = influences.values().map(Vec::len).sum();
    influences
        .into_iter()
        .map(|(category, scores)| {
            (
                category,
                CategoryStats {
                    percentage: scores.len() as f64 / total as f64 * 100.0,
                    count: scores.len(),
                    avg_influence: mean(&scores),
                },
            )
        })
        .collect()
}

fn percent(value: f64, precision: usize) -> String {
    format!("{:.*}%", precision, value * 100.0)
}

fn json_visualization(explanation: &Explanation) -> String {
    let factors: serde_json::Map<String, Value> = explanation
        .context_influence
        .iter()
        .map(|(name, f)| {
            (
                name.clone(),
                json!({
                    "value": f.value,
                    "influence": f.influence_score,
                    "confidence": f.confidence,
                    "category": f.category.as_str(),
                }),
            )
        })
        .collect();

    let view = json!({
        "decision": {
            "id": explanation.decision_id,
            "timestamp": explanation.timestamp.to_rfc3339(),
            "confidence": explanation.confidence,
        },
        "reasoning": {
            "steps": explanation.reasoning_steps,
            "evidence": explanation.evidence,
        },
        "context": {
            "factors": factors,
            "key_factors": explanation.key_factors,
        },
        "metadata": explanation.metadata.as_map(),
    });
    format!("{view:#}")
}

fn text_visualization(explanation: &Explanation) -> String {
    let mut lines = vec![
        format!("Decision Explanation (ID: {})", explanation.decision_id),
        format!("Timestamp: {}", explanation.timestamp.to_rfc3339()),
        "\nReasoning Steps:".to_string(),
    ];
    for (i, step) in explanation.reasoning_steps.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, step));
    }

    lines.push("\nEvidence:".to_string());
    for (group, items) in explanation.evidence.groups() {
        for item in items {
            lines.push(format!("- [{group}] {item}"));
        }
    }

    lines.push("\nContext Influence:".to_string());
    for factor in explanation.ranked_factors() {
        lines.push(format!(
            "- {} ({}): {:.2}",
            factor.name, factor.category, factor.influence_score
        ));
    }

    lines.push("\nKey Factors:".to_string());
    for name in &explanation.key_factors {
        if let Some(factor) = explanation.context_influence.get(name) {
            lines.push(format!("- {}: {:.2}", name, factor.influence_score));
        }
    }

    lines.push("\nConfidence Score:".to_string());
    lines.push(percent(explanation.confidence, 2));
    lines.join("\n")
}

fn short_summary(explanation: &Explanation) -> String {
    let factors: Vec<String> = explanation
        .ranked_factors()
        .into_iter()
        .take(KEY_FACTOR_COUNT)
        .map(|f| format!("{} ({:.2})", f.name, f.influence_score))
        .collect();

    format!(
        "Decision made with {} confidence. Key factors: {}. Based on {} reasoning steps.",
        percent(explanation.confidence, 1),
        factors.join(", "),
        explanation.reasoning_steps.len()
    )
}

fn medium_summary(explanation: &Explanation) -> String {
    let factors: Vec<String> = explanation
        .ranked_factors()
        .into_iter()
        .map(|f| {
            format!(
                "- {} ({}): {:.2} (confidence: {:.2})",
                f.name, f.category, f.influence_score, f.confidence
            )
        })
        .collect();
    let steps: Vec<String> = explanation
        .reasoning_steps
        .iter()
        .map(|s| format!("- {s}"))
        .collect();

    format!(
        "Decision Analysis\n\
         ================\n\
         Confidence: {}\n\
         Type: {}\n\n\
         Key Factors:\n{}\n\n\
         Reasoning Steps:\n{}\n\n\
         Made at: {}",
        percent(explanation.confidence, 1),
        explanation.metadata.decision_type.as_str(),
        factors.join("\n"),
        steps.join("\n"),
        explanation.timestamp.to_rfc3339()
    )
}

fn long_summary(explanation: &Explanation) -> String {
    let evidence: Vec<String> = explanation
        .evidence
        .groups()
        .iter()
        .map(|(group, items)| {
            let mut block = format!("{group}:");
            for item in items.iter() {
                block.push_str(&format!("\n- {item}"));
            }
            block
        })
        .collect();

    let mut by_category: BTreeMap<FactorCategory, Vec<&ContextFactor>> = BTreeMap::new();
    for factor in explanation.context_influence.values() {
        by_category.entry(factor.category).or_default().push(factor);
    }
    let categories: Vec<String> = by_category
        .iter()
        .map(|(category, factors)| {
            let mut block = format!("{category}:");
            for f in factors {
                block.push_str(&format!("\n- {}: {:.2}", f.name, f.influence_score));
            }
            block
        })
        .collect();

    format!(
        "{}\n\n\
         Evidence Analysis\n\
         ================\n\
         {}\n\n\
         Context Categories\n\
         =================\n\
         {}",
        medium_summary(explanation),
        evidence.join("\n"),
        categories.join("\n")
    )
}
