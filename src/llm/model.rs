use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use super::client::LlmClient;
use super::types::{ChatRequest, DecisionResponse, Message};
use crate::config::ModelConfig;
use crate::error::{LlmError, LlmResult};
use crate::prompts::DECISION_PROMPT;
use crate::reasoning::ContextMap;

/// A model that turns an input plus context into a decision.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    /// Produce a decision for `input` given `context`.
    async fn process_input(&self, input: &str, context: &ContextMap) -> LlmResult<DecisionResponse>;

    /// Feed user feedback back into the model.
    async fn update_learning(&self, feedback: &str, context: &ContextMap) -> LlmResult<()>;

    /// Describe the model and the learning state it holds.
    async fn model_context(&self) -> serde_json::Value;
}

/// Feedback stored by [`GptModel`] for continuous learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback: String,
    pub context: ContextMap,
    pub received_at: DateTime<Utc>,
}

/// [`DecisionModel`] backed by a chat completions endpoint.
pub struct GptModel {
    client: LlmClient,
    config: ModelConfig,
    /// Feedback grouped by the context's `id` field.
    history: RwLock<HashMap<String, Vec<FeedbackRecord>>>,
}

impl GptModel {
    /// Create a model over an existing client.
    pub fn new(client: LlmClient, config: ModelConfig) -> Self {
        Self {
            client,
            config,
            history: RwLock::new(HashMap::new()),
        }
    }

    fn build_messages(&self, input: &str, context: &ContextMap) -> Vec<Message> {
        let mut messages = vec![Message::system(DECISION_PROMPT)];

        if self.config.domain != "general" {
            messages.push(Message::system(format!("Domain: {}", self.config.domain)));
        }

        if !context.is_empty() {
            let rendered = serde_json::to_string(context).unwrap_or_default();
            messages.push(Message::user(format!("Context: {}", rendered)));
        }

        messages.push(Message::user(input.to_string()));
        messages
    }
}

fn context_id(context: &ContextMap) -> String {
    match context.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "default".to_string(),
    }
}

#[async_trait]
impl DecisionModel for GptModel {
    async fn process_input(&self, input: &str, context: &ContextMap) -> LlmResult<DecisionResponse> {
        let request = ChatRequest::new(&self.config.model, self.build_messages(input, context))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = self.client.chat(request).await?;
        let completion = response.completion().ok_or_else(|| LlmError::InvalidResponse {
            message: "Response contained no choices".to_string(),
        })?;

        Ok(DecisionResponse::from_completion(completion))
    }

    async fn update_learning(&self, feedback: &str, context: &ContextMap) -> LlmResult<()> {
        if !self.config.continuous_learning {
            debug!("Continuous learning disabled, feedback ignored");
            return Ok(());
        }

        let record = FeedbackRecord {
            feedback: feedback.to_string(),
            context: context.clone(),
            received_at: Utc::now(),
        };

        self.history
            .write()
            .await
            .entry(context_id(context))
            .or_default()
            .push(record);
        Ok(())
    }

    async fn model_context(&self) -> serde_json::Value {
        let history = self.history.read().await;
        json!({
            "model": self.config.model,
            "domain": self.config.domain,
            "context_history": *history,
        })
    }
}
