//! # IntelliAgent
//!
//! LLM-backed decision making with built-in explanation and confidence
//! scoring.
//!
//! ## Features
//!
//! - **Decisions**: a chat-completion model behind rate limiting, caching and
//!   per-user context
//! - **Beliefs**: statements with evidence-count confidence
//! - **Chain of Thought**: linked reasoning steps with context snapshots
//! - **Uncertainty**: confidence, entropy, variance and spread combined into
//!   one score
//! - **Explainability**: context-influence weighting, evidence, summaries,
//!   comparisons and historical analysis
//! - **Workflows**: named multi-step decision pipelines with per-step timeouts
//! - **Versioning**: model weight snapshots with rollback
//!
//! ## Architecture
//!
//! ```text
//! DecisionMaker → DecisionModel (GptModel → chat completions HTTP)
//!       ↓
//! reasoning engines (belief, chain, uncertainty, explainability)
//!       ↓
//! JSON documents (disk cache, versions, templates, metrics)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use intelliagent::{Config, DecisionMaker, GptModel, LlmClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     intelliagent::logging::init_logging(&config.logging);
//!
//!     let client = LlmClient::new(&config.llm, config.request.clone())?;
//!     let model = Arc::new(GptModel::new(client, config.model.clone()));
//!     let agent = DecisionMaker::new(&config, model);
//!
//!     let outcome = agent.make_decision("alice", "Should I rebalance?", None).await?;
//!     println!("{} ({:.0}%)", outcome.decision, outcome.confidence * 100.0);
//!     Ok(())
//! }
//! ```

/// Decision maker and multi-step workflows.
pub mod agent;
/// In-memory and disk-backed decision caches.
pub mod cache;
/// Configuration loaded from environment variables.
pub mod config;
/// Model deployments and rollback.
pub mod deployment;
/// Error types and result aliases for the application.
pub mod error;
/// Chat-completion client and decision models.
pub mod llm;
/// Tracing setup and structured agent events.
pub mod logging;
/// Request metrics.
pub mod metrics;
/// System prompts and prompt templates.
pub mod prompts;
/// Per-user rate limiting.
pub mod rate_limit;
/// Belief, chain-of-thought, uncertainty and explanation engines.
pub mod reasoning;
/// JSON document storage.
pub mod storage;
/// Validation of user input.
pub mod validation;
/// Model version control.
pub mod versioning;

pub use agent::{BatchItem, ComplexDecisionMaker, DecisionMaker, DecisionOutcome, DecisionStep};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use llm::{DecisionModel, GptModel, LlmClient};
pub use reasoning::ContextMap;
