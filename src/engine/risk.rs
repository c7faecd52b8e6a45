//! Portfolio risk scoring
//!
//! contribution = quantity × weight / 100, score = Σ contributions.
//! Pure and deterministic for a given weight table.

use super::format::round_presentation;
use crate::error::OrchestrationError;
use crate::models::{Holding, RiskDetail, RiskLevel, RiskReport};
use crate::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

const LOW_UPPER_BOUND: Decimal = dec!(5);
const MEDIUM_UPPER_BOUND: Decimal = dec!(10);
const NORMALIZER: Decimal = Decimal::ONE_HUNDRED;

/// Ticker → risk weight; unlisted tickers weigh 1.0
#[derive(Debug, Clone, PartialEq)]
pub struct RiskWeights {
    weights: HashMap<String, Decimal>,
    default_weight: Decimal,
}

impl RiskWeights {
    /// Weights must be non-negative, otherwise the level stops being
    /// monotonic in quantity.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let mut weights = HashMap::new();
        for (ticker, weight) in pairs {
            let ticker = ticker.into();
            if weight.is_sign_negative() && !weight.is_zero() {
                return Err(OrchestrationError::ConfigError(format!(
                    "risk weight for {} must be non-negative, got {}",
                    ticker, weight
                )));
            }
            weights.insert(ticker, weight);
        }

        Ok(Self {
            weights,
            default_weight: Decimal::ONE,
        })
    }

    pub fn weight_for(&self, ticker: &str) -> Decimal {
        self.weights
            .get(ticker)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            weights: HashMap::from([
                ("0700.HK".to_string(), dec!(1.2)),
                ("AAPL".to_string(), dec!(1.1)),
            ]),
            default_weight: Decimal::ONE,
        }
    }
}

/// score ≤ 5 → LOW, 5 < score ≤ 10 → MEDIUM, score > 10 → HIGH
pub fn classify_risk(score: Decimal) -> RiskLevel {
    if score > MEDIUM_UPPER_BOUND {
        RiskLevel::High
    } else if score > LOW_UPPER_BOUND {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn calculate_portfolio_risk(holdings: &[Holding], weights: &RiskWeights) -> RiskReport {
    let mut score = Decimal::ZERO;
    let mut details = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let contribution = Decimal::from(holding.quantity)
            .saturating_mul(weights.weight_for(&holding.ticker))
            / NORMALIZER;
        score = score.saturating_add(contribution);

        details.push(RiskDetail {
            ticker: holding.ticker.clone(),
            risk_contribution: round_presentation(contribution),
        });
    }

    // Bands apply to the raw sum; rounding is presentation only
    RiskReport {
        total_risk_score: round_presentation(score),
        risk_level: classify_risk(score),
        details,
    }
}
