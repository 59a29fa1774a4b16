//! Context-window budget
//!
//! Decides whether a prompt plus a reserved completion allowance fits the
//! target model's context window. Token counting is delegated to a
//! [`Tokenizer`]; this module only owns the model→limit table and the
//! comparison.

use std::fmt;
use tracing::warn;

/// Known completion models and their context-window sizes in tokens
pub const CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("text-davinci-003", 4096),
    ("text-davinci-002", 4096),
    ("text-curie-001", 2048),
    ("text-babbage-001", 2048),
    ("text-ada-001", 2048),
    ("davinci-002", 16384),
    ("babbage-002", 16384),
    ("gpt-3.5-turbo-instruct", 4096),
];

/// Fatal startup errors; no run can proceed past one of these
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Model not in [`CONTEXT_LIMITS`] and no explicit limit given
    UnknownModel {
        /// Requested model identifier
        model: String,
    },
    /// No tokenizer could be constructed for the model
    Tokenizer {
        /// Requested model identifier
        model: String,
        /// Underlying failure
        message: String,
    },
    /// Endpoint credentials missing
    MissingApiKey,
    /// A configuration value is out of range
    InvalidValue {
        /// Setting name
        field: String,
        /// What was wrong with it
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownModel { model } => write!(
                f,
                "Unknown model '{}': no context limit configured (known: {})",
                model,
                known_models().join(", ")
            ),
            ConfigError::Tokenizer { model, message } => {
                write!(f, "No tokenizer for model '{}': {}", model, message)
            }
            ConfigError::MissingApiKey => write!(
                f,
                "Missing API key: set {} or pass --api-key",
                crate::llm::config::API_KEY_ENV
            ),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid value for {}: {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Model identifiers present in the limit table
pub fn known_models() -> Vec<&'static str> {
    CONTEXT_LIMITS.iter().map(|(m, _)| *m).collect()
}

/// Target model and its context-window size, fixed for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpointConfig {
    model: String,
    context_limit: usize,
}

impl ModelEndpointConfig {
    /// Look the model up in [`CONTEXT_LIMITS`]
    pub fn for_model(model: &str) -> Result<Self, ConfigError> {
        CONTEXT_LIMITS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, limit)| Self {
                model: model.to_string(),
                context_limit: *limit,
            })
            .ok_or_else(|| ConfigError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// Use an explicit limit, for models outside the table
    pub fn with_context_limit(model: &str, context_limit: usize) -> Result<Self, ConfigError> {
        if context_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "context_limit".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            model: model.to_string(),
            context_limit,
        })
    }

    /// Model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Context window in tokens
    pub fn context_limit(&self) -> usize {
        self.context_limit
    }
}

/// Opaque token counting service
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` encodes to
    fn count_tokens(&self, text: &str) -> usize;
}

/// Encoding used for models tiktoken does not recognise
pub const FALLBACK_ENCODING: &str = "cl100k_base";

/// BPE tokenizer matching the target model's vocabulary
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenTokenizer {
    /// Load the encoding registered for `model`
    pub fn for_model(model: &str) -> Result<Self, ConfigError> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| ConfigError::Tokenizer {
            model: model.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { bpe })
    }

    /// Tokenizer for a run
    ///
    /// Models with an explicit context limit may be unknown to tiktoken; those
    /// fall back to [`FALLBACK_ENCODING`].
    pub fn for_run(model: &str, explicit_limit: bool) -> Result<Self, ConfigError> {
        match Self::for_model(model) {
            Err(err) if explicit_limit => {
                warn!(model, error = %err, encoding = FALLBACK_ENCODING, "Using fallback encoding");
                let bpe = tiktoken_rs::cl100k_base().map_err(|e| ConfigError::Tokenizer {
                    model: model.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Self { bpe })
            }
            other => other,
        }
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Counts whitespace-separated words; a stand-in where exact BPE counts do not matter
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Context-window check for one model
pub struct LengthBudget {
    config: ModelEndpointConfig,
    tokenizer: Box<dyn Tokenizer>,
}

impl LengthBudget {
    /// Create a budget over a model config and tokenizer
    pub fn new(config: ModelEndpointConfig, tokenizer: Box<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    /// Model config the budget applies to
    pub fn config(&self) -> &ModelEndpointConfig {
        &self.config
    }

    /// Token count of `text` under the model's tokenizer
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }

    /// `true` iff `tokens(prompt) + reserved < context_limit`
    pub fn fits(&self, prompt: &str, reserved_completion_tokens: usize) -> bool {
        self.fits_count(self.count_tokens(prompt), reserved_completion_tokens)
    }

    /// Same comparison for an already-counted prompt
    pub fn fits_count(&self, prompt_tokens: usize, reserved_completion_tokens: usize) -> bool {
        prompt_tokens.saturating_add(reserved_completion_tokens) < self.config.context_limit
    }
}

impl fmt::Debug for LengthBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LengthBudget")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
