//! Consistency verification of generated text against ground truth
//!
//! Lexical, not semantic: each rule looks for exact literal tokens in the
//! text. Correct figures placed anywhere pass; the reasoning around them
//! is not evaluated.
//!
//! Rules run in a fixed order and every rule reports, pass or fail, so the
//! full issue list is available even on success.

use crate::config::VerificationConfig;
use crate::engine::format_amount;
use crate::models::{
    ConsistencyIssue, ConsistencyReport, IssueKind, PnLDetail, PnLReport, Severity,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Ground truth a narrative is checked against, already rendered
pub struct GroundTruth<'a> {
    pub total_pnl: String,
    pub total_return_rate: &'a str,
    pub details: &'a [PnLDetail],
}

/// Trait for consistency rules
pub trait ConsistencyRule: Send + Sync {
    fn kind(&self) -> IssueKind;

    fn check(&self, text: &str, truth: &GroundTruth<'_>) -> ConsistencyIssue;
}

/// Verification engine that runs rules in registration order
pub struct ConsistencyVerifier {
    rules: Vec<Box<dyn ConsistencyRule>>,
}

impl ConsistencyVerifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ConsistencyRule>) {
        self.rules.push(rule);
    }

    /// Consistent iff no rule reported a FAIL
    pub fn verify(
        &self,
        text: &str,
        total_pnl: Decimal,
        total_return_rate: &str,
        details: &[PnLDetail],
    ) -> ConsistencyReport {
        let truth = GroundTruth {
            total_pnl: format_amount(total_pnl),
            total_return_rate,
            details,
        };

        let issues: Vec<ConsistencyIssue> = self
            .rules
            .iter()
            .map(|rule| rule.check(text, &truth))
            .collect();

        let is_consistent = !issues.iter().any(|i| i.severity == Severity::Fail);

        for issue in issues.iter().filter(|i| i.severity != Severity::Pass) {
            warn!(kind = ?issue.kind, severity = ?issue.severity, "{}", issue.detail);
        }

        info!(
            rule_count = self.rules.len(),
            consistent = is_consistent,
            "Consistency verification completed"
        );

        ConsistencyReport {
            is_consistent,
            issues,
        }
    }

    pub fn verify_report(&self, text: &str, report: &PnLReport) -> ConsistencyReport {
        self.verify(text, report.total_pnl, &report.total_return_rate, &report.details)
    }
}

impl Default for ConsistencyVerifier {
    fn default() -> Self {
        create_default_verifier(&VerificationConfig::default())
    }
}

fn issue(kind: IssueKind, severity: Severity, detail: String) -> ConsistencyIssue {
    ConsistencyIssue {
        kind,
        severity,
        detail,
    }
}

//
// ========== Rules ==========
//

/// Rule: the exact total PnL literal must appear
pub struct TotalPnlRule;

impl ConsistencyRule for TotalPnlRule {
    fn kind(&self) -> IssueKind {
        IssueKind::MissingPnl
    }

    fn check(&self, text: &str, truth: &GroundTruth<'_>) -> ConsistencyIssue {
        if text.contains(truth.total_pnl.as_str()) {
            issue(
                self.kind(),
                Severity::Pass,
                format!("Total PnL {} is present", truth.total_pnl),
            )
        } else {
            issue(
                self.kind(),
                Severity::Fail,
                format!("Total PnL {} is missing or wrong", truth.total_pnl),
            )
        }
    }
}

/// Rule: the exact total return literal must appear
pub struct TotalReturnRule;

impl ConsistencyRule for TotalReturnRule {
    fn kind(&self) -> IssueKind {
        IssueKind::MissingReturn
    }

    fn check(&self, text: &str, truth: &GroundTruth<'_>) -> ConsistencyIssue {
        if text.contains(truth.total_return_rate) {
            issue(
                self.kind(),
                Severity::Pass,
                format!("Total return {} is present", truth.total_return_rate),
            )
        } else {
            issue(
                self.kind(),
                Severity::Fail,
                format!("Total return {} is missing or wrong", truth.total_return_rate),
            )
        }
    }
}

/// Rule: at least one of the leading positions should be named (non-fatal)
pub struct HoldingsMentionedRule {
    leading: usize,
}

impl HoldingsMentionedRule {
    pub fn new(leading: usize) -> Self {
        Self { leading }
    }
}

impl ConsistencyRule for HoldingsMentionedRule {
    fn kind(&self) -> IssueKind {
        IssueKind::NoHoldingsMentioned
    }

    fn check(&self, text: &str, truth: &GroundTruth<'_>) -> ConsistencyIssue {
        let mentioned = truth
            .details
            .iter()
            .take(self.leading)
            .filter(|d| text.contains(d.ticker.as_str()))
            .count();

        if mentioned == 0 {
            issue(
                self.kind(),
                Severity::Warn,
                "No individual position is mentioned".to_string(),
            )
        } else {
            issue(
                self.kind(),
                Severity::Pass,
                format!("{} leading position(s) mentioned", mentioned),
            )
        }
    }
}

/// Rule: the risk disclaimer marker must appear
pub struct RiskDisclaimerRule {
    marker: String,
}

impl RiskDisclaimerRule {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl ConsistencyRule for RiskDisclaimerRule {
    fn kind(&self) -> IssueKind {
        IssueKind::MissingRiskDisclaimer
    }

    fn check(&self, text: &str, _truth: &GroundTruth<'_>) -> ConsistencyIssue {
        if text.contains(self.marker.as_str()) {
            issue(self.kind(), Severity::Pass, "Risk disclaimer present".to_string())
        } else {
            issue(self.kind(), Severity::Fail, "Risk disclaimer missing".to_string())
        }
    }
}

/// Create a verifier with the standard rules, in their fixed order
pub fn create_default_verifier(config: &VerificationConfig) -> ConsistencyVerifier {
    let mut verifier = ConsistencyVerifier::new();
    verifier.add_rule(Box::new(TotalPnlRule));
    verifier.add_rule(Box::new(TotalReturnRule));
    verifier.add_rule(Box::new(HoldingsMentionedRule::new(config.tickers_checked)));
    verifier.add_rule(Box::new(RiskDisclaimerRule::new(config.disclaimer_marker.clone())));
    verifier
}

//
// ================= Tests =================
//
