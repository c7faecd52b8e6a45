//! Pipeline dispatcher
//!
//! RECEIVED → INPUT_CHECK → (REJECTED | DATA_FETCH) → COMPUTE → RETRIEVE
//!          → PROMPT_BUILD → INFER → VERIFY → FINALIZE → DONE
//!
//! Strictly forward. A rejected query ends the request before any data is
//! fetched. Degraded quotes, inference error payloads and inconsistent
//! narratives are not errors: the request still runs to DONE.

use crate::audit::{compute_prompt_digest, compute_snapshot_hash, RequestTrace};
use crate::config::AppConfig;
use crate::engine::{calculate_attribution, calculate_portfolio_risk};
use crate::guardrails::Guardrails;
use crate::inference::{build_client, EnvSecretResolver, InferenceClient, SecretResolver};
use crate::models::{DispatchOutcome, Holding, MarketQuote, PipelineStage};
use crate::prompt::build_report_prompt;
use crate::retrieval::{SearchEngine, SourceRanker};
use crate::sources::{HoldingsSource, NewsSource, QuoteSource};
use crate::verification::{create_default_verifier, ConsistencyVerifier};
use crate::Result;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Dispatcher {
    config: AppConfig,
    guardrails: Guardrails,
    verifier: ConsistencyVerifier,
    search_engine: SearchEngine,
    ranker: SourceRanker,
    holdings_source: Arc<dyn HoldingsSource>,
    quote_source: Arc<dyn QuoteSource>,
    inference: Arc<dyn InferenceClient>,
}

impl Dispatcher {
    pub fn new(
        config: AppConfig,
        holdings_source: Arc<dyn HoldingsSource>,
        quote_source: Arc<dyn QuoteSource>,
        news_source: Arc<dyn NewsSource>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            guardrails: Guardrails::new(config.guardrails.clone()),
            verifier: create_default_verifier(&config.verification),
            search_engine: SearchEngine::new(news_source),
            ranker: SourceRanker::new(&config.retrieval),
            holdings_source,
            quote_source,
            inference,
            config,
        }
    }

    /// Build the inference client from the configured route for the
    /// configured task, resolving its credential from the environment
    pub fn from_config(
        config: AppConfig,
        holdings_source: Arc<dyn HoldingsSource>,
        quote_source: Arc<dyn QuoteSource>,
        news_source: Arc<dyn NewsSource>,
    ) -> Self {
        Self::with_secrets(config, holdings_source, quote_source, news_source, &EnvSecretResolver)
    }

    pub fn with_secrets(
        config: AppConfig,
        holdings_source: Arc<dyn HoldingsSource>,
        quote_source: Arc<dyn QuoteSource>,
        news_source: Arc<dyn NewsSource>,
        secrets: &dyn SecretResolver,
    ) -> Self {
        let route = config.inference.routes.resolve(config.inference.task);
        info!(
            task = ?config.inference.task,
            backend = ?route.backend,
            model = %route.model,
            "Selected inference route"
        );
        let inference = build_client(route, secrets);
        Self::new(config, holdings_source, quote_source, news_source, inference)
    }

    pub fn inference_name(&self) -> &str {
        self.inference.name()
    }

    /// Run one request through the pipeline.
    /// `Err` only for faults the pipeline cannot continue past.
    pub async fn handle_request(&self, user_id: &str, query: &str) -> Result<DispatchOutcome> {
        let start_time = Instant::now();
        let mut trace = RequestTrace::new();
        let request_id = trace.request_id();

        info!(
            request_id = %request_id,
            user_id = %user_id,
            query_len = query.len(),
            "Dispatcher: request received"
        );

        // === INPUT_CHECK ===
        trace.enter(PipelineStage::InputCheck)?;
        let decision = self.guardrails.validate_input(query);
        if !decision.allowed {
            let message = decision.message.unwrap_or_default();
            warn!(request_id = %request_id, "Query rejected: {}", message);

            trace.enter(PipelineStage::Rejected)?;
            trace.note(&message);

            return Ok(DispatchOutcome {
                request_id,
                stage: PipelineStage::Rejected,
                response: message,
                verified: false,
                consistency: None,
                pnl: None,
                risk: None,
                documents: Vec::new(),
                prompt_digest: None,
                trace: trace.into_trail(),
            });
        }

        // === DATA_FETCH ===
        trace.enter(PipelineStage::DataFetch)?;
        let holdings = self.holdings_source.get_holdings(user_id).await?;
        let quotes = self.fetch_quotes(&holdings).await;
        trace.note(format!(
            "{} holdings, {} quotes",
            holdings.len(),
            quotes.len()
        ));

        // === COMPUTE ===
        trace.enter(PipelineStage::Compute)?;
        let pnl = calculate_attribution(&holdings, &quotes);
        let risk = calculate_portfolio_risk(&holdings, &self.config.risk_weights);
        trace.note(format!(
            "total_pnl={} risk_level={} snapshot={}",
            pnl.total_pnl,
            risk.risk_level,
            compute_snapshot_hash(&pnl)
        ));

        // === RETRIEVE ===
        trace.enter(PipelineStage::Retrieve)?;
        let topic = holdings.first().map(|h| h.ticker.as_str()).unwrap_or("");
        let search_query = format!("{} {}", topic, query);
        let documents = self.ranker.rank(self.search_engine.search(&search_query).await);
        debug!(request_id = %request_id, documents = documents.len(), "Context retrieved");
        trace.note(format!("{} documents", documents.len()));

        // === PROMPT_BUILD ===
        trace.enter(PipelineStage::PromptBuild)?;
        let prompt = build_report_prompt(&pnl, &risk, &documents);
        let prompt_digest = compute_prompt_digest(&prompt);
        trace.note(format!("digest={}", prompt_digest));

        // === INFER ===
        trace.enter(PipelineStage::Infer)?;
        let raw_response = self
            .inference
            .generate(&prompt, Some(&self.config.inference.system_instruction))
            .await;
        trace.note(format!("{} chars from {}", raw_response.len(), self.inference.name()));

        // === VERIFY ===
        trace.enter(PipelineStage::Verify)?;
        let consistency = self.verifier.verify_report(&raw_response, &pnl);
        let verified = consistency.is_consistent;
        if !verified {
            warn!(
                request_id = %request_id,
                failures = consistency.failures().count(),
                "Response failed consistency check"
            );
        }
        trace.note(if verified { "consistent" } else { "inconsistent" });

        // === FINALIZE ===
        trace.enter(PipelineStage::Finalize)?;
        let mut response = self.guardrails.validate_output(&raw_response);
        if !verified {
            response = self.guardrails.annotate_unverified(&response);
        }

        trace.enter(PipelineStage::Done)?;

        info!(
            request_id = %request_id,
            verified,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Dispatcher: request completed"
        );

        Ok(DispatchOutcome {
            request_id,
            stage: PipelineStage::Done,
            response,
            verified,
            consistency: Some(consistency),
            pnl: Some(pnl),
            risk: Some(risk),
            documents,
            prompt_digest: Some(prompt_digest),
            trace: trace.into_trail(),
        })
    }

    /// One concurrent lookup per distinct ticker. A lookup that stalls past
    /// the timeout is left out of the map.
    async fn fetch_quotes(&self, holdings: &[Holding]) -> HashMap<String, MarketQuote> {
        let mut seen = HashSet::new();
        let tickers: Vec<&str> = holdings
            .iter()
            .map(|h| h.ticker.as_str())
            .filter(|t| seen.insert(*t))
            .collect();

        let timeout = self.config.fetch.quote_timeout;
        let lookups = tickers
            .iter()
            .map(|ticker| self.lookup_quote(ticker, timeout));

        join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .map(|quote| (quote.ticker.clone(), quote))
            .collect()
    }

    async fn lookup_quote(&self, ticker: &str, timeout: Duration) -> Option<MarketQuote> {
        match tokio::time::timeout(timeout, self.quote_source.get_quote(ticker)).await {
            Ok(mut quote) => {
                if quote.is_degraded() {
                    warn!(ticker = %ticker, note = ?quote.note, "Using degraded quote");
                }
                // Keyed by the ticker we asked for
                quote.ticker = ticker.to_string();
                Some(quote)
            }
            Err(_) => {
                warn!(
                    ticker = %ticker,
                    timeout_ms = timeout.as_millis() as u64,
                    "Quote lookup timed out; falling back to cost price"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::MockInferenceClient;
    use crate::sources::{MockNewsData, MockUserDb, StaticQuoteSource};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GROUNDED: &str = "Total PnL 5050.0, return 13.65%. 0700.HK led. Risk Disclaimer: markets carry risk.";

    fn dispatcher(inference: Arc<dyn InferenceClient>, quotes: Arc<dyn QuoteSource>) -> Dispatcher {
        Dispatcher::new(
            AppConfig::default(),
            Arc::new(MockUserDb::new()),
            quotes,
            Arc::new(MockNewsData::new()),
            inference,
        )
    }

    struct StallingQuotes;

    #[async_trait]
    impl QuoteSource for StallingQuotes {
        async fn get_quote(&self, ticker: &str) -> MarketQuote {
            if ticker == "BABA" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            MarketQuote::live(ticker, dec!(345.0), dec!(0), 0)
        }
    }

    struct SlowQuotes {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for SlowQuotes {
        async fn get_quote(&self, ticker: &str) -> MarketQuote {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            MarketQuote::live(ticker, dec!(100), dec!(0), 0)
        }
    }

    struct CountingQuotes(AtomicUsize);

    #[async_trait]
    impl QuoteSource for CountingQuotes {
        async fn get_quote(&self, ticker: &str) -> MarketQuote {
            self.0.fetch_add(1, Ordering::SeqCst);
            MarketQuote::live(ticker, dec!(100), dec!(0), 0)
        }
    }

    #[tokio::test]
    async fn test_grounded_response_completes_verified() {
        let d = dispatcher(
            Arc::new(MockInferenceClient::with_response(GROUNDED)),
            Arc::new(StaticQuoteSource::demo()),
        );

        let outcome = d.handle_request("user_001", "How is my portfolio doing?").await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert!(outcome.verified);
        assert_eq!(outcome.response, GROUNDED);
        assert_eq!(outcome.pnl.unwrap().total_pnl, dec!(5050));
        assert_eq!(outcome.prompt_digest.map(|d| d.len()), Some(64));
    }

    #[tokio::test]
    async fn test_trail_covers_every_stage_in_order() {
        let d = dispatcher(
            Arc::new(MockInferenceClient::with_response(GROUNDED)),
            Arc::new(StaticQuoteSource::demo()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();
        let stages: Vec<&str> = outcome
            .trace
            .iter()
            .filter(|line| !line.contains(':'))
            .map(String::as_str)
            .collect();

        assert_eq!(
            stages,
            vec![
                "INPUT_CHECK",
                "DATA_FETCH",
                "COMPUTE",
                "RETRIEVE",
                "PROMPT_BUILD",
                "INFER",
                "VERIFY",
                "FINALIZE",
                "DONE"
            ]
        );
    }

    #[tokio::test]
    async fn test_inconsistent_response_gets_caveat_and_disclaimer() {
        let d = dispatcher(
            Arc::new(MockInferenceClient::with_response("Total PnL 10000.0, return 13.65%.")),
            Arc::new(StaticQuoteSource::demo()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert!(!outcome.verified);
        assert!(outcome.response.contains("[Risk Disclaimer]"));
        assert!(outcome.response.contains("System note"));
    }

    #[tokio::test]
    async fn test_stalled_lookup_falls_back_to_cost() {
        let mut config = AppConfig::default();
        config.fetch.quote_timeout = Duration::from_millis(50);
        let d = Dispatcher::new(
            config,
            Arc::new(MockUserDb::new()),
            Arc::new(StallingQuotes),
            Arc::new(MockNewsData::new()),
            Arc::new(MockInferenceClient::default()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();
        let pnl = outcome.pnl.unwrap();
        let baba = pnl.details.iter().find(|d| d.ticker == "BABA").unwrap();

        assert_eq!(baba.pnl, dec!(0));
        assert_eq!(baba.current_price, baba.cost_price);
    }

    #[tokio::test]
    async fn test_quote_lookups_run_concurrently() {
        let delay = Duration::from_millis(200);
        let holdings: Vec<Holding> = ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(|t| Holding::new(t, dec!(90), 10))
            .collect();
        let quotes = Arc::new(SlowQuotes {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let d = Dispatcher::new(
            AppConfig::default(),
            Arc::new(MockUserDb::with_holdings(holdings.clone())),
            quotes.clone(),
            Arc::new(MockNewsData::new()),
            Arc::new(MockInferenceClient::default()),
        );

        let start = Instant::now();
        let fetched = d.fetch_quotes(&holdings).await;
        let elapsed = start.elapsed();

        assert_eq!(fetched.len(), 5);
        assert_eq!(quotes.peak.load(Ordering::SeqCst), 5);
        // Sequential lookups would take 5 × 200ms
        assert!(elapsed < delay * 3, "lookups took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_huge_upstream_price_does_not_abort_request() {
        let holdings = vec![
            Holding::new("X", dec!(1), u64::MAX),
            Holding::new("BABA", dec!(80), 50),
        ];
        let quotes = StaticQuoteSource::new([
            MarketQuote::live("X", dec!(10000000000), dec!(0), 0),
            MarketQuote::live("BABA", dec!(85), dec!(0), 0),
        ]);
        let d = Dispatcher::new(
            AppConfig::default(),
            Arc::new(MockUserDb::with_holdings(holdings)),
            Arc::new(quotes),
            Arc::new(MockNewsData::new()),
            Arc::new(MockInferenceClient::default()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert_eq!(outcome.pnl.unwrap().total_pnl, dec!(250));
    }

    #[tokio::test]
    async fn test_duplicate_tickers_are_looked_up_once() {
        let holdings = vec![
            Holding::new("AAPL", dec!(90), 10),
            Holding::new("AAPL", dec!(95), 5),
            Holding::new("BABA", dec!(80), 1),
        ];
        let quotes = Arc::new(CountingQuotes(AtomicUsize::new(0)));
        let d = Dispatcher::new(
            AppConfig::default(),
            Arc::new(MockUserDb::with_holdings(holdings)),
            quotes.clone(),
            Arc::new(MockNewsData::new()),
            Arc::new(MockInferenceClient::default()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();

        assert_eq!(quotes.0.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.pnl.unwrap().details.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_holdings_still_complete() {
        let d = Dispatcher::new(
            AppConfig::default(),
            Arc::new(MockUserDb::with_holdings(Vec::new())),
            Arc::new(StaticQuoteSource::demo()),
            Arc::new(MockNewsData::new()),
            Arc::new(MockInferenceClient::default()),
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();
        let pnl = outcome.pnl.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert_eq!(pnl.total_pnl, dec!(0));
        assert_eq!(pnl.total_return_rate, "0.00%");
    }

    #[tokio::test]
    async fn test_missing_credential_flows_through_as_text() {
        struct NoSecrets;
        impl SecretResolver for NoSecrets {
            fn resolve(&self, _name: &str) -> Option<String> {
                None
            }
        }

        let d = Dispatcher::with_secrets(
            AppConfig::default(),
            Arc::new(MockUserDb::new()),
            Arc::new(StaticQuoteSource::demo()),
            Arc::new(MockNewsData::new()),
            &NoSecrets,
        );

        let outcome = d.handle_request("user_001", "analyze").await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert!(!outcome.verified);
        assert!(outcome.response.starts_with("[Error]"));
    }
}
