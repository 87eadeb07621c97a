//! Chat-completion client and the model abstraction used by the decision maker.
//!
//! - [`LlmClient`]: HTTP client for an OpenAI-compatible chat completions API
//! - [`DecisionModel`]: the seam between the decision maker and a concrete model
//! - [`GptModel`]: a [`DecisionModel`] backed by [`LlmClient`]

mod client;
mod model;
mod types;


pub use client::LlmClient;
pub use model::{DecisionModel, FeedbackRecord, GptModel};
pub use types::*;

/// JSON payload of a completion: the trimmed text when it already is JSON,
/// otherwise the body of the first fenced code block (with or without a
/// `json` tag).
pub(crate) fn extract_json_from_completion(completion: &str) -> Option<&str> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    let (_, after_fence) = completion.split_once("```")?;
    let body = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let body = body.split("```").next().unwrap_or(body).trim();
    (!body.is_empty()).then_some(body)
}
