//! PnL attribution
//!
//! Per-position and aggregate profit & loss from holdings and quotes.
//! Never fails: a missing quote prices the position at cost (zero PnL),
//! a zero cost basis yields a 0% return. Arithmetic is checked; a position
//! whose figures overflow is priced at cost as well.

use super::format::{format_percent, round_presentation};
use crate::models::{Holding, MarketQuote, PnLDetail, PnLReport, PnlSummary};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// `((current / cost) - 1) * 100`, defined as 0 when cost is 0 or on overflow
fn position_return(current: Decimal, cost: Decimal) -> Decimal {
    percent_change(current, cost).unwrap_or(Decimal::ZERO)
}

fn percent_change(current: Decimal, cost: Decimal) -> Option<Decimal> {
    if cost.is_zero() {
        return Some(Decimal::ZERO);
    }
    current
        .checked_div(cost)?
        .checked_sub(Decimal::ONE)?
        .checked_mul(HUNDRED)
}

/// `(pnl, cost basis)` of one position
fn position_values(current: Decimal, cost: Decimal, quantity: Decimal) -> Option<(Decimal, Decimal)> {
    let pnl = current.checked_sub(cost)?.checked_mul(quantity)?;
    let basis = cost.checked_mul(quantity)?;
    Some((pnl, basis))
}

/// Compute the PnL report, keeping the order of `holdings`
pub fn calculate_attribution(
    holdings: &[Holding],
    quotes: &HashMap<String, MarketQuote>,
) -> PnLReport {
    let mut details = Vec::with_capacity(holdings.len());
    let mut total_pnl = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;

    for holding in holdings {
        let quoted = quotes
            .get(&holding.ticker)
            .map(|q| q.current_price)
            .unwrap_or(holding.cost);
        let quantity = Decimal::from(holding.quantity);

        let (current_price, pnl, basis) = match position_values(quoted, holding.cost, quantity) {
            Some((pnl, basis)) => (quoted, pnl, basis),
            None => {
                warn!(
                    ticker = %holding.ticker,
                    price = %quoted,
                    quantity = holding.quantity,
                    "Position value overflows; pricing at cost"
                );
                let basis = holding.cost.checked_mul(quantity).unwrap_or(Decimal::ZERO);
                (holding.cost, Decimal::ZERO, basis)
            }
        };

        match (total_pnl.checked_add(pnl), total_cost.checked_add(basis)) {
            (Some(next_pnl), Some(next_cost)) => {
                total_pnl = next_pnl;
                total_cost = next_cost;
            }
            _ => warn!(ticker = %holding.ticker, "Portfolio totals overflow; position left out"),
        }

        details.push(PnLDetail {
            ticker: holding.ticker.clone(),
            current_price: round_presentation(current_price),
            cost_price: round_presentation(holding.cost),
            quantity: holding.quantity,
            pnl: round_presentation(pnl),
            return_rate: format_percent(position_return(current_price, holding.cost)),
        });
    }

    let total_return_rate = if total_cost.is_zero() {
        Decimal::ZERO
    } else {
        total_pnl
            .checked_div(total_cost)
            .and_then(|ratio| ratio.checked_mul(HUNDRED))
            .unwrap_or(Decimal::ZERO)
    };

    let summary = if total_pnl > Decimal::ZERO {
        PnlSummary::Profit
    } else {
        PnlSummary::Loss
    };

    PnLReport {
        total_pnl: round_presentation(total_pnl),
        total_return_rate: format_percent(total_return_rate),
        details,
        summary,
    }
}
