//! Core evaluation logic
//!
//! - `budget`: model context limits and the prompt-length check
//! - `prompt`: template rendering and demonstration fitting
//! - `scorer`: answer normalization, match metrics, and choice distributions
//! - `orchestrator`: the per-record evaluation passes

pub mod budget;
pub mod orchestrator;
pub mod prompt;
pub mod scorer;

pub use budget::{
    known_models, ConfigError, LengthBudget, ModelEndpointConfig, TiktokenTokenizer, Tokenizer,
    WhitespaceTokenizer, CONTEXT_LIMITS, FALLBACK_ENCODING,
};
pub use orchestrator::{
    AbstentionMetrics, AbstentionOutcome, ConflictMetrics, EvalSettings, Evaluator, SkipReason,
};
pub use prompt::{
    choice_suffix, split_choices, DemoMode, Demonstration, FittedPrompt, PromptBuilder,
    PromptRequest, PromptTooLong, Schema, Task,
};
pub use scorer::{
    aggregate_score, brier_score, conflict_rate, exact_match, normalize, recall, softmax,
    split_accuracy, ChoiceDistribution, ConflictRates, Gold, SplitAccuracy,
};
