use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Rate limit exceeded for {user_id} (remaining: {remaining})")]
    RateLimited { user_id: String, remaining: usize },
}

/// JSON file storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {key}")]
    NotFound { key: String },
}

/// LLM API errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Input and template validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation failed: {field} - {reason}")]
    Field { field: String, reason: String },

    #[error("Missing variable {name}")]
    MissingVariable { name: String },

    #[error("Template {name} not found")]
    UnknownTemplate { name: String },
}

/// Multi-step workflow errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Steps not registered: {steps:?}")]
    UnknownSteps { steps: Vec<String> },

    #[error("Workflow {name} not found")]
    UnknownWorkflow { name: String },

    #[error("Missing required context for {step}: {keys:?}")]
    MissingContext { step: String, keys: Vec<String> },
}

impl ValidationError {
    /// Shorthand for a field-level validation failure.
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl AppError {
    /// Shorthand for a missing entity.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
