//! Core data models for the portfolio analysis pipeline
//!
//! Every value here is created fresh for a single request and dropped when
//! the request completes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

//
// ================= Holdings & Quotes =================
//

/// A user's position in one ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub ticker: String,
    /// Unit cost basis
    pub cost: Decimal,
    pub quantity: u64,
}

impl Holding {
    pub fn new(ticker: impl Into<String>, cost: Decimal, quantity: u64) -> Self {
        Self {
            ticker: ticker.into(),
            cost,
            quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketQuote {
    pub ticker: String,
    pub current_price: Decimal,
    /// Day change, in percent
    pub change_percent: Decimal,
    pub volume: u64,
    /// Set when the quote is a fallback rather than a live value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MarketQuote {
    pub fn live(
        ticker: impl Into<String>,
        current_price: Decimal,
        change_percent: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            current_price,
            change_percent,
            volume,
            note: None,
        }
    }

    pub fn degraded(
        ticker: impl Into<String>,
        current_price: Decimal,
        change_percent: Decimal,
        volume: u64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            current_price,
            change_percent,
            volume,
            note: Some(note.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.note.is_some()
    }
}

//
// ================= PnL =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnLDetail {
    pub ticker: String,
    pub current_price: Decimal,
    pub cost_price: Decimal,
    pub quantity: u64,
    pub pnl: Decimal,
    /// Formatted as `12.34%`
    pub return_rate: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PnlSummary {
    Profit,
    Loss,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnLReport {
    pub total_pnl: Decimal,
    /// Formatted as `12.34%`
    pub total_return_rate: String,
    /// Same order as the holdings the report was derived from
    pub details: Vec<PnLDetail>,
    pub summary: PnlSummary,
}

//
// ================= Risk =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskDetail {
    pub ticker: String,
    pub risk_contribution: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskReport {
    pub total_risk_score: Decimal,
    pub risk_level: RiskLevel,
    pub details: Vec<RiskDetail>,
}

//
// ================= Retrieval =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    pub source: String,
    /// In [0, 1]
    pub relevance: f64,
}

//
// ================= Verification =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    MissingPnl,
    MissingReturn,
    NoHoldingsMentioned,
    MissingRiskDisclaimer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Fail,
    Warn,
    Pass,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn failures(&self) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Fail)
    }

    pub fn has_failure(&self, kind: IssueKind) -> bool {
        self.failures().any(|i| i.kind == kind)
    }
}

//
// ================= Guardrails =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardrailDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GuardrailDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: Some(message.into()),
        }
    }
}

//
// ================= Trading Behavior =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub ticker: String,
    pub price: Decimal,
    pub quantity: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradingStyle {
    Balanced,
    Accumulating,
    ProfitTaking,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BehaviorSummary {
    pub total_transactions: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub trading_style: TradingStyle,
}

//
// ================= Pipeline =================
//

/// Dispatcher states, in the only order they may be entered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Received,
    InputCheck,
    Rejected,
    DataFetch,
    Compute,
    Retrieve,
    PromptBuild,
    Infer,
    Verify,
    Finalize,
    Done,
}

impl PipelineStage {
    /// The single legal successor set of each stage
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Received, InputCheck)
                | (InputCheck, Rejected)
                | (InputCheck, DataFetch)
                | (DataFetch, Compute)
                | (Compute, Retrieve)
                | (Retrieve, PromptBuild)
                | (PromptBuild, Infer)
                | (Infer, Verify)
                | (Verify, Finalize)
                | (Finalize, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Rejected | PipelineStage::Done)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Received => "RECEIVED",
            PipelineStage::InputCheck => "INPUT_CHECK",
            PipelineStage::Rejected => "REJECTED",
            PipelineStage::DataFetch => "DATA_FETCH",
            PipelineStage::Compute => "COMPUTE",
            PipelineStage::Retrieve => "RETRIEVE",
            PipelineStage::PromptBuild => "PROMPT_BUILD",
            PipelineStage::Infer => "INFER",
            PipelineStage::Verify => "VERIFY",
            PipelineStage::Finalize => "FINALIZE",
            PipelineStage::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

/// Everything a caller learns about one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub request_id: Uuid,
    /// Terminal stage: `Rejected` or `Done`
    pub stage: PipelineStage,
    pub response: String,
    /// False when the narrative failed consistency checks
    pub verified: bool,
    pub consistency: Option<ConsistencyReport>,
    pub pnl: Option<PnLReport>,
    pub risk: Option<RiskReport>,
    pub documents: Vec<RetrievedDocument>,
    pub prompt_digest: Option<String>,
    pub trace: Vec<String>,
}

impl DispatchOutcome {
    pub fn is_rejected(&self) -> bool {
        self.stage == PipelineStage::Rejected
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for PnlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PnlSummary::Profit => "PROFIT",
            PnlSummary::Loss => "LOSS",
        };
        write!(f, "{}", s)
    }
}
