//! Tracing setup and structured agent events.

use std::fmt::Display;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr. Calling this twice is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_ok() {
        info!(level = %config.level, format = ?config.format, "Logging initialized");
    }
}

/// Record a decision made for a user.
pub fn log_decision(user_id: &str, input: &str, decision: &serde_json::Value) {
    info!(
        user_id = %user_id,
        input = %input,
        decision = %decision,
        "Decision made"
    );
}

/// Record an error together with the context it occurred in.
pub fn log_error(err: &dyn Display, context: &serde_json::Value) {
    error!(error = %err, context = %context, "Error occurred");
}

/// Record feedback received from a user.
pub fn log_feedback(user_id: &str, feedback: &str) {
    info!(user_id = %user_id, feedback = %feedback, "Feedback received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_event_helpers() {
        log_decision("user-1", "buy?", &json!({"decision": "hold"}));
        log_error(&"boom", &json!({"step": 2}));
        log_feedback("user-1", "great answer");
    }
}
