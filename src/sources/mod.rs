//! Data collaborators
//!
//! Holdings, quotes and news live outside the core. The core only sees
//! these traits; quote and news sources are infallible by signature and
//! hand back a placeholder instead of an error.

use crate::models::{Holding, MarketQuote, TradeAction, Transaction};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

pub mod market;
pub use market::HttpQuoteSource;

pub const DEGRADED_QUOTE_NOTE: &str = "Mock Data (Network Error)";
pub const NO_NEWS_PLACEHOLDER: &str = "No major news for this ticker";

#[async_trait]
pub trait HoldingsSource: Send + Sync {
    /// Ordered holdings; may be empty
    async fn get_holdings(&self, user_id: &str) -> Result<Vec<Holding>>;
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Always a structurally valid quote, degraded on internal failure
    async fn get_quote(&self, ticker: &str) -> MarketQuote;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn get_company_news(&self, ticker: &str) -> Vec<String>;
    async fn get_market_sentiment(&self) -> String;
}

/// Placeholder used when no live price can be had
pub fn degraded_quote(ticker: &str) -> MarketQuote {
    let mut rng = rand::thread_rng();
    let price = Decimal::from(rng.gen_range(10_000..50_000u32)) / Decimal::ONE_HUNDRED;
    let change = Decimal::from(rng.gen_range(-500..500i32)) / Decimal::ONE_HUNDRED;
    MarketQuote::degraded(ticker, price, change, 1_000_000, DEGRADED_QUOTE_NOTE)
}

//
// ========== Mock Collaborators ==========
//

/// Mock user store returning a fixed demo portfolio
pub struct MockUserDb {
    holdings: Vec<Holding>,
}

impl MockUserDb {
    pub fn new() -> Self {
        Self {
            holdings: vec![
                Holding::new("0700.HK", dec!(300.0), 100),
                Holding::new("BABA", dec!(80.0), 50),
                Holding::new("AAPL", dec!(150.0), 20),
            ],
        }
    }

    pub fn with_holdings(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    pub fn get_recent_transactions(&self, _user_id: &str, limit: usize) -> Vec<Transaction> {
        let history = [
            (NaiveDate::from_ymd_opt(2023, 10, 1), "0700.HK", dec!(300.0), 100),
            (NaiveDate::from_ymd_opt(2023, 9, 15), "BABA", dec!(80.0), 50),
        ];

        history
            .into_iter()
            .filter_map(|(date, ticker, price, quantity)| {
                Some(Transaction {
                    date: date?,
                    action: TradeAction::Buy,
                    ticker: ticker.to_string(),
                    price,
                    quantity,
                })
            })
            .take(limit)
            .collect()
    }
}

impl Default for MockUserDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HoldingsSource for MockUserDb {
    async fn get_holdings(&self, _user_id: &str) -> Result<Vec<Holding>> {
        Ok(self.holdings.clone())
    }
}

/// Quote source backed by a fixed price table
pub struct StaticQuoteSource {
    quotes: HashMap<String, MarketQuote>,
}

impl StaticQuoteSource {
    pub fn new(quotes: impl IntoIterator<Item = MarketQuote>) -> Self {
        Self {
            quotes: quotes.into_iter().map(|q| (q.ticker.clone(), q)).collect(),
        }
    }

    /// Prices matching the demo portfolio
    pub fn demo() -> Self {
        Self::new([
            MarketQuote::live("0700.HK", dec!(345.0), dec!(1.20), 18_500_000),
            MarketQuote::live("BABA", dec!(85.0), dec!(-0.45), 12_300_000),
            MarketQuote::live("AAPL", dec!(165.0), dec!(0.85), 54_000_000),
        ])
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn get_quote(&self, ticker: &str) -> MarketQuote {
        self.quotes
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| degraded_quote(ticker))
    }
}

/// Mock news corpus
pub struct MockNewsData {
    news: HashMap<&'static str, Vec<&'static str>>,
}

const SENTIMENTS: &[&str] = &["bullish", "range-bound", "bearish"];

impl MockNewsData {
    pub fn new() -> Self {
        Self {
            news: HashMap::from([
                (
                    "0700.HK",
                    vec![
                        "Tencent quarterly revenue beats expectations",
                        "Gaming business recovers, analysts turn positive on Tencent",
                    ],
                ),
                (
                    "BABA",
                    vec![
                        "Alibaba restructuring and spin-off plans progress",
                        "E-commerce competition intensifies as Alibaba seeks new growth",
                    ],
                ),
                (
                    "AAPL",
                    vec![
                        "iPhone 15 sales strong in launch quarter",
                        "Apple Vision Pro release approaching",
                    ],
                ),
            ]),
        }
    }
}

impl Default for MockNewsData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsSource for MockNewsData {
    async fn get_company_news(&self, ticker: &str) -> Vec<String> {
        match self.news.get(ticker) {
            Some(items) => items.iter().map(|s| s.to_string()).collect(),
            None => vec![NO_NEWS_PLACEHOLDER.to_string()],
        }
    }

    async fn get_market_sentiment(&self) -> String {
        SENTIMENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("range-bound")
            .to_string()
    }
}
