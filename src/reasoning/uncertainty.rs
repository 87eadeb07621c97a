use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{mean, variance, ContextMap};

const CONFIDENCE_WEIGHT: f64 = 0.4;
const ENTROPY_WEIGHT: f64 = 0.2;
const VARIANCE_WEIGHT: f64 = 0.2;
const SPREAD_WEIGHT: f64 = 0.2;
const LOG_EPSILON: f64 = 1e-10;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Statistics over a set of prediction probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyMetrics {
    pub confidence: f64,
    pub entropy: f64,
    pub variance: f64,
    pub prediction_spread: f64,
}

/// Details behind an uncertainty score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UncertaintyReport {
    Evaluated {
        metrics: UncertaintyMetrics,
        context_factors: BTreeMap<String, f64>,
        threshold: f64,
    },
    Unavailable {
        error: String,
    },
}

impl UncertaintyReport {
    pub fn metrics(&self) -> Option<&UncertaintyMetrics> {
        match self {
            UncertaintyReport::Evaluated { metrics, .. } => Some(metrics),
            UncertaintyReport::Unavailable { .. } => None,
        }
    }
}

/// Scores uncertainty over model predictions and context.
#[derive(Debug, Clone)]
pub struct UncertaintyHandler {
    confidence_threshold: f64,
}

impl Default for UncertaintyHandler {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl UncertaintyHandler {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Score in [0, 1], higher meaning less certain.
    ///
    /// Without predictions the score is 1.0.
    pub fn evaluate_uncertainty(
        &self,
        predictions: &[f64],
        context: &ContextMap,
    ) -> (f64, UncertaintyReport) {
        if predictions.is_empty() {
            return (
                1.0,
                UncertaintyReport::Unavailable {
                    error: "No predictions available".to_string(),
                },
            );
        }

        let metrics = calculate_metrics(predictions);
        let score = uncertainty_score(&metrics);

        (
            score,
            UncertaintyReport::Evaluated {
                metrics,
                context_factors: context_uncertainty(context, Utc::now()),
                threshold: self.confidence_threshold,
            },
        )
    }

    /// Whether the confidence implied by `uncertainty_score` meets the threshold.
    pub fn is_confident(&self, uncertainty_score: f64) -> bool {
        1.0 - uncertainty_score >= self.confidence_threshold
    }
}

fn calculate_metrics(predictions: &[f64]) -> UncertaintyMetrics {
    let max = predictions.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = predictions.iter().copied().fold(f64::INFINITY, f64::min);

    UncertaintyMetrics {
        confidence: mean(predictions),
        entropy: -predictions
            .iter()
            .map(|p| p * (p + LOG_EPSILON).log2())
            .sum::<f64>(),
        variance: variance(predictions),
        prediction_spread: max - min,
    }
}

fn uncertainty_score(metrics: &UncertaintyMetrics) -> f64 {
    let score = CONFIDENCE_WEIGHT * (1.0 - metrics.confidence)
        + ENTROPY_WEIGHT * metrics.entropy.min(1.0)
        + VARIANCE_WEIGHT * (metrics.variance * 2.0).min(1.0)
        + SPREAD_WEIGHT * metrics.prediction_spread;
    score.clamp(0.0, 1.0)
}

fn context_uncertainty(context: &ContextMap, now: DateTime<Utc>) -> BTreeMap<String, f64> {
    let mut factors = BTreeMap::new();

    if context.is_empty() {
        factors.insert("missing_context".to_string(), 1.0);
        return factors;
    }

    if let Some(confidence) = context.get("confidence").and_then(Value::as_f64) {
        factors.insert("explicit_confidence".to_string(), 1.0 - confidence);
    }

    if let Some(raw) = context.get("timestamp") {
        match raw.as_str().and_then(parse_timestamp) {
            Some(ts) => {
                let age = (now - ts).num_milliseconds() as f64 / 1000.0;
                factors.insert(
                    "temporal_uncertainty".to_string(),
                    (age / SECONDS_PER_DAY).min(1.0),
                );
            }
            None => {
                factors.insert("invalid_timestamp".to_string(), 1.0);
            }
        }
    }

    factors
}

/// RFC 3339, or a naive ISO date/datetime read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
