//! HTTP-backed quote source
//!
//! Calls a market data service and normalizes whatever it returns (a bare
//! price or a quote record) into `MarketQuote` before it reaches the core.
//! Any failure on this path produces a degraded quote instead.

use super::{degraded_quote, QuoteSource};
use crate::error::OrchestrationError;
use crate::models::MarketQuote;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Quote payload as served upstream
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuote {
    Price(f64),
    Record {
        #[serde(alias = "price")]
        current_price: f64,
        #[serde(default)]
        change_percent: Option<ChangePercent>,
        #[serde(default, alias = "last_volume")]
        volume: Option<u64>,
    },
}

/// `1.25` or `"1.25%"`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChangePercent {
    Number(f64),
    Text(String),
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Ok(Decimal::try_from(value)?.round_dp(2))
}

impl ChangePercent {
    fn to_decimal(&self) -> Result<Decimal> {
        match self {
            ChangePercent::Number(v) => to_decimal(*v),
            ChangePercent::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .parse::<Decimal>()
                .map_err(|e| {
                    OrchestrationError::DataSourceError(format!(
                        "unparseable change_percent '{}': {}",
                        s, e
                    ))
                }),
        }
    }
}

fn normalize_quote(ticker: &str, raw: RawQuote) -> Result<MarketQuote> {
    let (price, change, volume) = match raw {
        RawQuote::Price(price) => (price, None, None),
        RawQuote::Record {
            current_price,
            change_percent,
            volume,
        } => (current_price, change_percent, volume),
    };

    if !price.is_finite() || price < 0.0 {
        return Err(OrchestrationError::DataSourceError(format!(
            "invalid price {} for {}",
            price, ticker
        )));
    }

    let change = match change {
        Some(c) => c.to_decimal()?,
        None => Decimal::ZERO,
    };

    Ok(MarketQuote::live(
        ticker,
        to_decimal(price)?,
        change,
        volume.unwrap_or(0),
    ))
}

pub struct HttpQuoteSource {
    client: Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, ticker: &str) -> Result<MarketQuote> {
        let url = format!("{}/quote/{}", self.base_url, ticker);

        let response = self.client.get(&url).send().await.map_err(|e| {
            OrchestrationError::DataSourceError(format!("quote request failed for {}: {}", ticker, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::DataSourceError(format!(
                "market API returned {} for {}",
                status, ticker
            )));
        }

        let raw = response.json::<RawQuote>().await.map_err(|e| {
            OrchestrationError::DataSourceError(format!("invalid quote payload for {}: {}", ticker, e))
        })?;

        normalize_quote(ticker, raw)
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn get_quote(&self, ticker: &str) -> MarketQuote {
        match self.fetch(ticker).await {
            Ok(quote) => {
                debug!(ticker = %ticker, price = %quote.current_price, "Quote fetched");
                quote
            }
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Quote lookup failed, using degraded quote");
                degraded_quote(ticker)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(ticker: &str, json: &str) -> Result<MarketQuote> {
        let raw: RawQuote = serde_json::from_str(json)?;
        normalize_quote(ticker, raw)
    }

    #[test]
    fn test_bare_number_payload() {
        let quote = parse("AAPL", "165.004").unwrap();
        assert_eq!(quote.current_price, dec!(165.00));
        assert_eq!(quote.change_percent, Decimal::ZERO);
        assert!(!quote.is_degraded());
    }

    #[test]
    fn test_record_payload_variants() {
        let quote = parse(
            "0700.HK",
            r#"{"current_price": 345.0, "change_percent": "1.25%", "volume": 1200}"#,
        )
        .unwrap();
        assert_eq!(quote.current_price, dec!(345));
        assert_eq!(quote.change_percent, dec!(1.25));
        assert_eq!(quote.volume, 1200);

        let quote = parse("BABA", r#"{"price": 85.5, "change_percent": -0.4}"#).unwrap();
        assert_eq!(quote.current_price, dec!(85.5));
        assert_eq!(quote.change_percent, dec!(-0.4));
        assert_eq!(quote.volume, 0);
    }

    #[test]
    fn test_invalid_payloads_rejected() {
        assert!(parse("X", r#"{"volume": 10}"#).is_err());
        assert!(parse("X", "-1.0").is_err());
        assert!(parse("X", r#"{"price": 1.0, "change_percent": "n/a"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades() {
        let source = HttpQuoteSource::new("http://127.0.0.1:9").unwrap();
        let quote = source.get_quote("AAPL").await;

        assert_eq!(quote.ticker, "AAPL");
        assert!(quote.is_degraded());
    }
}
