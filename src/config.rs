//! Dispatcher configuration
//!
//! One explicit value built at startup and handed to the dispatcher.
//! Defaults carry the built-in tables; environment variables (optionally
//! from `.env`) override them. Credentials are never part of this value,
//! only the names of the variables they are resolved from.

use crate::engine::RiskWeights;
use crate::error::OrchestrationError;
use crate::inference::{BackendKind, InferenceRoutes, TaskType};
use crate::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUOTE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_API_PORT: u16 = 8080;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant.";

const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &["insider", "fraud", "illegal"];
const DEFAULT_REQUIRED_DISCLAIMERS: &[&str] = &["Risk Disclaimer", "For reference only"];

pub const DEFAULT_DISCLAIMER_BLOCK: &str = "\n\n[Risk Disclaimer] Markets carry risk; invest with caution. \
This report is for reference only and does not constitute investment advice.";

pub const DEFAULT_UNVERIFIED_CAVEAT: &str = "\n\n---\n**System note**: this response did not pass the \
automated consistency check against the computed portfolio figures. Verify every number before relying on it.";

#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    /// Checked in order; the first hit names the rejection
    pub forbidden_keywords: Vec<String>,
    /// Output is compliant when it contains any of these
    pub required_disclaimers: Vec<String>,
    pub disclaimer_block: String,
    pub unverified_caveat: String,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            forbidden_keywords: to_owned_list(DEFAULT_FORBIDDEN_KEYWORDS),
            required_disclaimers: to_owned_list(DEFAULT_REQUIRED_DISCLAIMERS),
            disclaimer_block: DEFAULT_DISCLAIMER_BLOCK.to_string(),
            unverified_caveat: DEFAULT_UNVERIFIED_CAVEAT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Token the narrative must carry to count as disclaimed
    pub disclaimer_marker: String,
    /// How many leading positions are looked for by ticker
    pub tickers_checked: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            disclaimer_marker: "Risk Disclaimer".to_string(),
            tickers_checked: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalConfig {
    /// `None` passes every document through
    pub min_relevance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound on a single quote lookup
    pub quote_timeout: Duration,
    pub market_api_base_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            quote_timeout: Duration::from_millis(DEFAULT_QUOTE_TIMEOUT_MS),
            market_api_base_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub task: TaskType,
    pub routes: InferenceRoutes,
    pub system_instruction: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            task: TaskType::DetailedReport,
            routes: InferenceRoutes::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub guardrails: GuardrailConfig,
    pub verification: VerificationConfig,
    pub risk_weights: RiskWeights,
    pub retrieval: RetrievalConfig,
    pub fetch: FetchConfig,
    pub inference: InferenceConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and apply environment overrides
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("GUARDRAIL_FORBIDDEN_KEYWORDS") {
            config.guardrails.forbidden_keywords = parse_list(&raw);
        }
        if let Some(raw) = lookup("GUARDRAIL_REQUIRED_DISCLAIMERS") {
            config.guardrails.required_disclaimers = parse_list(&raw);
        }
        if let Some(raw) = lookup("RISK_WEIGHTS") {
            config.risk_weights = parse_weights(&raw)?;
        }
        if let Some(raw) = lookup("RETRIEVAL_MIN_RELEVANCE") {
            config.retrieval.min_relevance = Some(parse_relevance(&raw)?);
        }
        if let Some(raw) = lookup("QUOTE_TIMEOUT_MS") {
            let ms = raw.trim().parse::<u64>().map_err(|e| {
                OrchestrationError::ConfigError(format!("QUOTE_TIMEOUT_MS: {}", e))
            })?;
            config.fetch.quote_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("MARKET_API_BASE_URL") {
            let trimmed = raw.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.fetch.market_api_base_url = Some(trimmed.to_string());
            }
        }
        if let Some(raw) = lookup("INFERENCE_TASK") {
            config.inference.task = TaskType::parse(&raw).ok_or_else(|| {
                OrchestrationError::ConfigError(format!("unknown INFERENCE_TASK '{}'", raw))
            })?;
        }
        if let Some(raw) = lookup("INFERENCE_BACKEND_OVERRIDE") {
            config.inference.routes = match raw.trim().to_lowercase().as_str() {
                "" | "openai" | "openai_compatible" => config.inference.routes,
                "mock" => config.inference.routes.with_backend(BackendKind::Mock),
                "gemini" => InferenceRoutes::gemini(),
                other => {
                    return Err(OrchestrationError::ConfigError(format!(
                        "unknown INFERENCE_BACKEND_OVERRIDE '{}'",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }
}

/// Port for the HTTP front door: `PORT`, then `API_PORT`, then 8080
pub fn api_port_from_env() -> Result<u16> {
    match env::var("PORT").or_else(|_| env::var("API_PORT")) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| OrchestrationError::ConfigError(format!("invalid port '{}': {}", raw, e))),
        Err(_) => Ok(DEFAULT_API_PORT),
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `0700.HK=1.2,AAPL=1.1`
fn parse_weights(raw: &str) -> Result<RiskWeights> {
    let mut pairs = Vec::new();
    for entry in parse_list(raw) {
        let (ticker, weight) = entry.split_once('=').ok_or_else(|| {
            OrchestrationError::ConfigError(format!("RISK_WEIGHTS entry '{}' is not TICKER=weight", entry))
        })?;
        let weight = Decimal::from_str(weight.trim()).map_err(|e| {
            OrchestrationError::ConfigError(format!("RISK_WEIGHTS weight for {}: {}", ticker, e))
        })?;
        pairs.push((ticker.trim().to_string(), weight));
    }
    RiskWeights::from_pairs(pairs)
}

fn parse_relevance(raw: &str) -> Result<f64> {
    let value = raw.trim().parse::<f64>().map_err(|e| {
        OrchestrationError::ConfigError(format!("RETRIEVAL_MIN_RELEVANCE: {}", e))
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(OrchestrationError::ConfigError(format!(
            "RETRIEVAL_MIN_RELEVANCE must be within [0, 1], got {}",
            value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = AppConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.guardrails.forbidden_keywords, vec!["insider", "fraud", "illegal"]);
        assert_eq!(config.retrieval.min_relevance, None);
        assert_eq!(config.fetch.quote_timeout, Duration::from_millis(5_000));
        assert_eq!(config.inference.task, TaskType::DetailedReport);
        assert_eq!(config.risk_weights.weight_for("0700.HK"), dec!(1.2));
    }

    #[test]
    fn test_overrides_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GUARDRAIL_FORBIDDEN_KEYWORDS", "pump, dump ,,"),
            ("RISK_WEIGHTS", "TSLA=2.5, NVDA=1.8"),
            ("RETRIEVAL_MIN_RELEVANCE", "0.6"),
            ("QUOTE_TIMEOUT_MS", "250"),
            ("MARKET_API_BASE_URL", "http://localhost:9000/"),
            ("INFERENCE_TASK", "quick_summary"),
            ("INFERENCE_BACKEND_OVERRIDE", "mock"),
        ]))
        .unwrap();

        assert_eq!(config.guardrails.forbidden_keywords, vec!["pump", "dump"]);
        assert_eq!(config.risk_weights.weight_for("TSLA"), dec!(2.5));
        assert_eq!(config.risk_weights.weight_for("0700.HK"), Decimal::ONE);
        assert_eq!(config.retrieval.min_relevance, Some(0.6));
        assert_eq!(config.fetch.quote_timeout, Duration::from_millis(250));
        assert_eq!(
            config.fetch.market_api_base_url.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.inference.task, TaskType::QuickSummary);
        assert_eq!(
            config.inference.routes.resolve(TaskType::DetailedReport).backend,
            BackendKind::Mock
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("RISK_WEIGHTS", "TSLA")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("RISK_WEIGHTS", "TSLA=-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("RETRIEVAL_MIN_RELEVANCE", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("INFERENCE_TASK", "poetry")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("INFERENCE_BACKEND_OVERRIDE", "llama")])).is_err());
    }

    #[test]
    fn test_gemini_backend_override() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("INFERENCE_TASK", "quick_summary"),
            ("INFERENCE_BACKEND_OVERRIDE", "Gemini"),
        ]))
        .unwrap();

        let route = config.inference.routes.resolve(config.inference.task);
        assert_eq!(route.backend, BackendKind::Gemini);
        assert_eq!(route.model, "gemini-2.0-flash-lite");
        assert_eq!(route.credential_env, "GEMINI_API_KEY");
    }
}
