//! Centralized prompt definitions and the prompt template engine.
//!
//! System prompts used by the built-in model live here as constants.
//! User-defined prompts are [`PromptTemplate`]s managed by a [`PromptEngine`].

mod templates;

pub use templates::{PromptEngine, PromptTemplate};

/// System prompt for decision making.
///
/// The JSON shape matches [`crate::llm::DecisionResponse`].
pub const DECISION_PROMPT: &str = r#"You are a careful decision-making assistant. Given an input and its context, decide what should be done and explain why.

Your response MUST be valid JSON in this exact format:
{
  "decision": "the decision, stated in one sentence",
  "reasoning": ["first reasoning step", "second reasoning step"],
  "predictions": [0.8, 0.7],
  "confidence": 0.75
}

Guidelines:
- reasoning lists the steps that led to the decision, in order
- predictions are the probabilities (0.0-1.0) you assign to the decision being correct under each line of reasoning
- confidence is your overall confidence between 0.0 and 1.0
- Use the context when it is relevant and say so in the reasoning

Always respond with valid JSON only, no other text."#;
