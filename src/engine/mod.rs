//! Deterministic finance engines
//!
//! These produce the ground truth a generated narrative is checked against.
//! No LLM, no I/O, no shared state.

pub mod behavior;
pub mod format;
pub mod pnl;
pub mod risk;

pub use behavior::analyze_transactions;
pub use format::{format_amount, format_percent};
pub use pnl::calculate_attribution;
pub use risk::{calculate_portfolio_risk, classify_risk, RiskWeights};
