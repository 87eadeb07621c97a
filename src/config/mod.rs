use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, ValidationError};

/// Models accepted by [`ModelConfig::validate`].
pub const ALLOWED_MODELS: [&str; 2] = ["gpt-4", "gpt-3.5-turbo"];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub model: ModelConfig,
    pub request: RequestConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub agent: AgentConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// LLM API endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Model selection and sampling parameters
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub domain: String,
    pub continuous_learning: bool,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Decision cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_secs: u64,
}

/// Per-user rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: usize,
}

/// Thresholds for the scoring engines
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub confidence_threshold: f64,
    pub learning_rate: f64,
}

/// Root directory for JSON documents (disk cache, versions, templates, metrics)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            api_key: env::var("OPENAI_API_KEY").map_err(|_| AppError::Config {
                message: "OPENAI_API_KEY is required".to_string(),
            })?,
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
        };

        let model = ModelConfig {
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            temperature: env_parse("LLM_TEMPERATURE", 0.7),
            max_tokens: env_parse("LLM_MAX_TOKENS", 150),
            domain: env::var("AGENT_DOMAIN").unwrap_or_else(|_| "general".to_string()),
            continuous_learning: env::var("CONTINUOUS_LEARNING")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
        };

        let cache = CacheConfig {
            max_size: env_parse("CACHE_MAX_SIZE", 1000),
            ttl_secs: env_parse("CACHE_TTL_SECS", 3600),
        };

        let rate_limit = RateLimitConfig {
            requests_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 60),
        };

        let agent = AgentConfig {
            confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", 0.7),
            learning_rate: env_parse("LEARNING_RATE", 0.1),
        };

        let storage = StorageConfig {
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let config = Config {
            llm,
            model,
            request,
            cache,
            rate_limit,
            agent,
            storage,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration for the given API key with every other value defaulted.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            llm: LlmConfig {
                api_key: api_key.into(),
                base_url: "https://api.openai.com".to_string(),
            },
            model: ModelConfig::default(),
            request: RequestConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check the API key and model parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ValidationError::field("api_key", "api_key cannot be empty"));
        }
        self.model.validate()
    }
}

impl ModelConfig {
    /// Enforce the accepted model names and sampling ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ValidationError::field(
                "temperature",
                format!("must be between 0.0 and 1.0, got {}", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::field("max_tokens", "must be greater than 0"));
        }
        if !ALLOWED_MODELS.contains(&self.model.as_str()) {
            return Err(ValidationError::field(
                "model",
                format!("model must be one of {:?}", ALLOWED_MODELS),
            ));
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Entry lifetime as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl StorageConfig {
    /// Directory holding the disk cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Directory holding model versions.
    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("model_versions")
    }

    /// Directory holding prompt templates.
    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("prompts")
    }

    /// Directory holding metrics snapshots.
    pub fn metrics_dir(&self) -> PathBuf {
        self.data_dir.join("metrics")
    }

    /// Directory holding model deployments.
    pub fn deployments_dir(&self) -> PathBuf {
        self.data_dir.join("deployments")
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            domain: "general".to_string(),
            continuous_learning: true,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_secs: 3600,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            learning_rate: 0.1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
