//! faithful-eval - Abstention and knowledge-conflict evaluation for completion models
//!
//! Measures two behaviours of a hosted text-completion model under different
//! prompt framings:
//!
//! - **Abstention**: multiple-choice questions where "I don't know" is a valid
//!   answer. Every choice is scored by its log-probability, and the softmax
//!   over choices gives accuracy split by answerable/unanswerable gold plus a
//!   Brier score for the abstain probability.
//! - **Knowledge conflict**: questions whose context contradicts memorized
//!   facts. Free-form answers are matched against both the counterfactual and
//!   the original answer to give the memorization ratio.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use faithful_eval::core::{LengthBudget, ModelEndpointConfig, TiktokenTokenizer};
//!
//! let config = ModelEndpointConfig::for_model("text-davinci-003").unwrap();
//! let budget = LengthBudget::new(
//!     config,
//!     Box::new(TiktokenTokenizer::for_model("text-davinci-003").unwrap()),
//! );
//! assert!(budget.fits("Q: Where is Rome?\nA:", 64));
//! ```

pub mod core;
pub mod data;
pub mod llm;

// Re-export commonly used items at crate root
pub use core::{
    ConfigError, EvalSettings, Evaluator, LengthBudget, ModelEndpointConfig, PromptBuilder,
    Schema,
};
pub use llm::client::CompletionClient;
pub use llm::{CompletionEndpoint, EndpointError};
