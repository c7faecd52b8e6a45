//! Portfolio Analysis Agent
//!
//! Answers free-text questions about a user's portfolio with a generated
//! narrative that is grounded in deterministically computed figures:
//! - PnL attribution and risk scoring are computed, never generated
//! - The prompt embeds the computed figures and demands they be cited verbatim
//! - The narrative is checked for those exact figures before it is returned
//! - Policy gates screen the query and guarantee a risk disclaimer
//!
//! PIPELINE:
//! RECEIVED → INPUT_CHECK → (REJECTED | DATA_FETCH) → COMPUTE → RETRIEVE
//!          → PROMPT_BUILD → INFER → VERIFY → FINALIZE → DONE

pub mod api;
pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod guardrails;
pub mod inference;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod sources;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use dispatcher::Dispatcher;
pub use models::*;
