//! Trading behavior classification from recent transactions

use crate::models::{BehaviorSummary, TradeAction, Transaction, TradingStyle};

/// `None` when there is no history to classify
pub fn analyze_transactions(transactions: &[Transaction]) -> Option<BehaviorSummary> {
    if transactions.is_empty() {
        return None;
    }

    let buy_count = transactions
        .iter()
        .filter(|t| t.action == TradeAction::Buy)
        .count();
    let sell_count = transactions.len() - buy_count;

    let trading_style = if buy_count > sell_count * 2 {
        TradingStyle::Accumulating
    } else if sell_count > buy_count {
        TradingStyle::ProfitTaking
    } else {
        TradingStyle::Balanced
    };

    Some(BehaviorSummary {
        total_transactions: transactions.len(),
        buy_count,
        sell_count,
        trading_style,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn tx(action: TradeAction) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
            action,
            ticker: "0700.HK".to_string(),
            price: dec!(300),
            quantity: 100,
        }
    }

    #[test]
    fn test_styles() {
        use TradeAction::*;

        let summary = analyze_transactions(&[tx(Buy), tx(Buy), tx(Buy), tx(Sell)]).unwrap();
        assert_eq!(summary.trading_style, TradingStyle::Accumulating);
        assert_eq!(summary.buy_count, 3);
        assert_eq!(summary.sell_count, 1);

        let summary = analyze_transactions(&[tx(Buy), tx(Sell), tx(Sell)]).unwrap();
        assert_eq!(summary.trading_style, TradingStyle::ProfitTaking);

        let summary = analyze_transactions(&[tx(Buy), tx(Buy), tx(Sell)]).unwrap();
        assert_eq!(summary.trading_style, TradingStyle::Balanced);

        // Only buys: 2 > 0 * 2
        let summary = analyze_transactions(&[tx(Buy), tx(Buy)]).unwrap();
        assert_eq!(summary.trading_style, TradingStyle::Accumulating);
    }

    #[test]
    fn test_empty_history() {
        assert!(analyze_transactions(&[]).is_none());
    }
}
