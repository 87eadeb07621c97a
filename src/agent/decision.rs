use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, CacheManager};
use crate::config::{Config, ModelConfig};
use crate::error::{AppError, AppResult};
use crate::llm::DecisionModel;
use crate::logging::{log_decision, log_error, log_feedback};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::rate_limit::RateLimiter;
use crate::reasoning::{
    Belief, BeliefGenerator, ChainOfThought, ContextAnalyzer, ContextMap, ExplainabilityEngine,
    Explanation, Feedback, FeedbackLearner, FeedbackOutcome, HistoricalAnalysis, SummaryFormat,
    Thought, ThoughtStep, UncertaintyHandler, UncertaintyReport, VisualizationFormat,
};
use crate::validation::UserInput;

/// Result of a single decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: String,
    /// `1 - uncertainty score`
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub uncertainty: UncertaintyReport,
    pub context: ContextMap,
    pub thought_chain: Vec<Thought>,
    pub explanation_id: String,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
}

/// One entry of [`DecisionMaker::batch_process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItem {
    Decided(Box<DecisionOutcome>),
    Failed { input: String, error: String },
}

impl BatchItem {
    pub fn outcome(&self) -> Option<&DecisionOutcome> {
        match self {
            BatchItem::Decided(outcome) => Some(outcome),
            BatchItem::Failed { .. } => None,
        }
    }
}

struct AgentState {
    cache: Box<dyn CacheBackend>,
    context_analyzer: ContextAnalyzer,
    chain: ChainOfThought,
    uncertainty: UncertaintyHandler,
    explainability: ExplainabilityEngine,
    beliefs: BeliefGenerator,
    feedback: FeedbackLearner,
    metrics: MetricsCollector,
    user_contexts: HashMap<String, ContextMap>,
    last_thought: HashMap<String, String>,
}

/// LLM-backed decision maker with per-user context.
pub struct DecisionMaker {
    model: Arc<dyn DecisionModel>,
    model_config: ModelConfig,
    rate_limiter: RateLimiter,
    state: Mutex<AgentState>,
}

impl DecisionMaker {
    /// Create a decision maker with an in-memory cache. Metrics snapshots go
    /// to the configured metrics directory when saved.
    pub fn new(config: &Config, model: Arc<dyn DecisionModel>) -> Self {
        let threshold = config.agent.confidence_threshold;
        let state = AgentState {
            cache: Box::new(CacheManager::from_config(&config.cache)),
            context_analyzer: ContextAnalyzer::default(),
            chain: ChainOfThought::new(),
            uncertainty: UncertaintyHandler::new(threshold),
            explainability: ExplainabilityEngine::new(),
            beliefs: BeliefGenerator::new(threshold),
            feedback: FeedbackLearner::new(config.agent.learning_rate),
            metrics: MetricsCollector::in_dir(config.storage.metrics_dir()),
            user_contexts: HashMap::new(),
            last_thought: HashMap::new(),
        };

        Self {
            model,
            model_config: config.model.clone(),
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            state: Mutex::new(state),
        }
    }

    /// Replace the decision cache.
    pub fn with_cache(mut self, cache: Box<dyn CacheBackend>) -> Self {
        self.state.get_mut().cache = cache;
        self
    }

    /// Replace the metrics collector.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.state.get_mut().metrics = metrics;
        self
    }

    /// Make a decision for `input`.
    ///
    /// Identical input and context are answered from the cache. Fails with
    /// [`AppError::RateLimited`] when the user is over the limit and with
    /// [`AppError::Llm`] when the model call fails.
    pub async fn make_decision(
        &self,
        user_id: &str,
        input: &str,
        context: Option<ContextMap>,
    ) -> AppResult<DecisionOutcome> {
        let start = Instant::now();
        let request = UserInput::new(user_id, input)?;
        let (user_id, input) = (request.user_id.as_str(), request.input.as_str());
        let context = context.unwrap_or_default();

        if !self.rate_limiter.check_limit(user_id) {
            return Err(AppError::RateLimited {
                user_id: user_id.to_string(),
                remaining: self.rate_limiter.get_remaining_requests(user_id),
            });
        }

        let key = cache_key(user_id, input, &context);
        let (enriched, thought_id) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            if let Some(hit) = state.cache.get(&key) {
                match serde_json::from_value::<DecisionOutcome>(hit) {
                    Ok(mut outcome) => {
                        outcome.cached = true;
                        self.record(state, start, true, false);
                        debug!(user_id = %user_id, "Decision served from cache");
                        return Ok(outcome);
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed cached decision"),
                }
            }

            let analyzed = state.context_analyzer.analyze(user_id, input, &context);
            let stored = state.user_contexts.get(user_id).cloned().unwrap_or_default();
            let merged = state.context_analyzer.merge_contexts(&stored, &analyzed);
            state
                .user_contexts
                .insert(user_id.to_string(), merged.clone());

            let previous = state.last_thought.get(user_id).cloned();
            let thought_id = state.chain.add_thought(input, 1.0, merged.clone(), previous);
            state
                .last_thought
                .insert(user_id.to_string(), thought_id.clone());

            (merged, thought_id)
        };

        let response = match self.model.process_input(input, &enriched).await {
            Ok(response) => response,
            Err(e) => {
                let err = AppError::from(e);
                log_error(&err, &json!({ "user_id": user_id, "input": input }));
                let mut guard = self.state.lock().await;
                self.record(&mut guard, start, false, true);
                return Err(err);
            }
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let (score, uncertainty) = state
            .uncertainty
            .evaluate_uncertainty(&response.predictions, &enriched);
        let confidence = 1.0 - score;

        let thought_chain: Vec<Thought> = state
            .chain
            .get_chain(Some(thought_id.as_str()))
            .into_iter()
            .cloned()
            .collect();
        let steps: Vec<ThoughtStep> = thought_chain.iter().map(ThoughtStep::from).collect();
        let explanation =
            state
                .explainability
                .generate_explanation(&response.decision, &enriched, &steps, confidence);
        state
            .beliefs
            .generate_belief(&response.decision, &enriched, response.reasoning.clone());

        let outcome = DecisionOutcome {
            decision: response.decision,
            confidence,
            reasoning: response.reasoning,
            uncertainty,
            context: enriched,
            thought_chain,
            explanation_id: explanation.decision_id,
            timestamp: Utc::now(),
            cached: false,
        };

        match serde_json::to_value(&outcome) {
            Ok(value) => {
                if let Err(e) = state.cache.set(&key, value) {
                    warn!(error = %e, "Failed to cache decision");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize decision for cache"),
        }
        self.record(state, start, false, false);
        drop(guard);

        log_decision(
            user_id,
            input,
            &json!({ "decision": outcome.decision, "confidence": outcome.confidence }),
        );
        Ok(outcome)
    }

    /// Feed user feedback to the learner and the model.
    pub async fn update_model(
        &self,
        user_id: &str,
        feedback: impl Into<Feedback>,
    ) -> AppResult<FeedbackOutcome> {
        let feedback = feedback.into();
        let request = UserInput::new(user_id, feedback.text())?;

        let (context, outcome) = {
            let mut state = self.state.lock().await;
            let context = state
                .user_contexts
                .get(&request.user_id)
                .cloned()
                .unwrap_or_default();
            let outcome = state
                .feedback
                .process_feedback(feedback.clone(), &context, None);
            (context, outcome)
        };

        self.model
            .update_learning(feedback.text(), &context)
            .await?;
        log_feedback(&request.user_id, feedback.text());

        info!(
            user_id = %request.user_id,
            score = outcome.score,
            "Model updated from feedback"
        );
        Ok(outcome)
    }

    /// Accumulated context for a user, empty if unknown.
    pub async fn get_decision_context(&self, user_id: &str) -> ContextMap {
        self.state
            .lock()
            .await
            .user_contexts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Decide on each input in turn. Failures are reported per item.
    pub async fn batch_process<S: AsRef<str>>(&self, user_id: &str, inputs: &[S]) -> Vec<BatchItem> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let input = input.as_ref();
            let item = match self.make_decision(user_id, input, None).await {
                Ok(outcome) => BatchItem::Decided(Box::new(outcome)),
                Err(e) => BatchItem::Failed {
                    input: input.to_string(),
                    error: e.to_string(),
                },
            };
            results.push(item);
        }
        results
    }

    pub async fn get_explanation(&self, explanation_id: &str) -> Option<Explanation> {
        self.state
            .lock()
            .await
            .explainability
            .get_explanation(explanation_id)
            .cloned()
    }

    pub async fn visualize_explanation(
        &self,
        explanation_id: &str,
        format: VisualizationFormat,
    ) -> String {
        self.state
            .lock()
            .await
            .explainability
            .visualize_explanation(explanation_id, format)
    }

    pub async fn summarize_explanation(&self, explanation_id: &str, format: SummaryFormat) -> String {
        self.state
            .lock()
            .await
            .explainability
            .summarize_explanation(explanation_id, format)
    }

    pub async fn historical_analysis(&self, time_window: Option<Duration>) -> HistoricalAnalysis {
        self.state
            .lock()
            .await
            .explainability
            .get_historical_analysis(time_window)
    }

    /// Beliefs formed from past decisions, at or above `min_confidence`.
    pub async fn beliefs(&self, min_confidence: Option<f64>) -> Vec<Belief> {
        self.state
            .lock()
            .await
            .beliefs
            .get_beliefs(min_confidence)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The user's thoughts, oldest first.
    pub async fn thought_chain(&self, user_id: &str) -> Vec<Thought> {
        let state = self.state.lock().await;
        match state.last_thought.get(user_id) {
            Some(last) => state
                .chain
                .get_chain(Some(last.as_str()))
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn context_importance(&self, context_key: &str) -> f64 {
        self.state
            .lock()
            .await
            .feedback
            .get_context_importance(context_key)
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.state.lock().await.metrics.snapshot().clone()
    }

    /// Persist the metrics collected so far.
    pub async fn save_metrics(&self) -> AppResult<Option<String>> {
        Ok(self.state.lock().await.metrics.save()?)
    }

    pub async fn model_context(&self) -> serde_json::Value {
        self.model.model_context().await
    }

    pub fn remaining_requests(&self, user_id: &str) -> usize {
        self.rate_limiter.get_remaining_requests(user_id)
    }

    fn record(&self, state: &mut AgentState, start: Instant, cache_hit: bool, error: bool) {
        state.metrics.record_request(
            start.elapsed(),
            &self.model_config.model,
            &self.model_config.domain,
            cache_hit,
            error,
        );
    }
}

/// The user scope, then the input followed by `key:value` context pairs
/// sorted by key, joined by `:`.
///
/// Cached outcomes carry the user's merged context and thought chain, so
/// keys never cross users. The scope is length-prefixed so a `:` inside a
/// user id cannot make two users' keys collide.
pub(crate) fn cache_key(user_id: &str, input: &str, context: &ContextMap) -> String {
    let mut pairs: Vec<(&String, &serde_json::Value)> = context.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut parts = vec![format!("{}#{user_id}", user_id.len()), input.to_string()];
    parts.extend(pairs.into_iter().map(|(k, v)| match v {
        serde_json::Value::String(s) => format!("{k}:{s}"),
        other => format!("{k}:{other}"),
    }));
    parts.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_sorts_context() {
        let mut context = ContextMap::new();
        context.insert("b".to_string(), json!(2));
        context.insert("a".to_string(), json!("x"));

        assert_eq!(cache_key("ann", "buy?", &context), "3#ann:buy?:a:x:b:2");
        assert_eq!(cache_key("ann", "buy?", &ContextMap::new()), "3#ann:buy?");
    }

    #[test]
    fn test_cache_key_scoped_per_user() {
        let context = ContextMap::new();
        assert_ne!(cache_key("ann", "buy?", &context), cache_key("bob", "buy?", &context));
        assert_ne!(cache_key("a:b", "c", &context), cache_key("a", "b:c", &context));
    }
}
