//! Keyword-based context retrieval
//!
//! Advisory context for the narrative. Nothing retrieved here is ground
//! truth and the verifier never looks at it.

use crate::models::RetrievedDocument;
use crate::sources::NewsSource;
use std::sync::Arc;
use tracing::debug;

pub mod ranker;
pub use ranker::SourceRanker;

pub const NEWS_SOURCE: &str = "News";
pub const SENTIMENT_SOURCE: &str = "MarketSentiment";

const NEWS_RELEVANCE: f64 = 0.9;
const SENTIMENT_RELEVANCE: f64 = 0.5;

/// Alias → ticker, scanned in order; the first alias found in the query wins
const TICKER_ALIASES: &[(&str, &str)] = &[
    ("0700", "0700.HK"),
    ("Tencent", "0700.HK"),
    ("腾讯", "0700.HK"),
    ("BABA", "BABA"),
    ("Alibaba", "BABA"),
    ("阿里", "BABA"),
    ("AAPL", "AAPL"),
    ("Apple", "AAPL"),
    ("苹果", "AAPL"),
];

/// Ticker referenced by the query, if any
pub fn match_ticker(query: &str) -> Option<&'static str> {
    TICKER_ALIASES
        .iter()
        .find(|(alias, _)| query.contains(alias))
        .map(|(_, ticker)| *ticker)
}

pub struct SearchEngine {
    news_source: Arc<dyn NewsSource>,
}

impl SearchEngine {
    pub fn new(news_source: Arc<dyn NewsSource>) -> Self {
        Self { news_source }
    }

    /// Unranked documents: ticker news when the query names a known ticker,
    /// plus one market sentiment snippet regardless.
    pub async fn search(&self, query: &str) -> Vec<RetrievedDocument> {
        let mut results = Vec::new();

        if let Some(ticker) = match_ticker(query) {
            debug!(ticker = %ticker, "Query matched ticker alias");
            for item in self.news_source.get_company_news(ticker).await {
                results.push(RetrievedDocument {
                    content: item,
                    source: NEWS_SOURCE.to_string(),
                    relevance: NEWS_RELEVANCE,
                });
            }
        }

        let sentiment = self.news_source.get_market_sentiment().await;
        results.push(RetrievedDocument {
            content: format!("Current market sentiment: {}", sentiment),
            source: SENTIMENT_SOURCE.to_string(),
            relevance: SENTIMENT_RELEVANCE,
        });

        results
    }
}
