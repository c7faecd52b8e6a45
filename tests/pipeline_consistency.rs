use async_trait::async_trait;
use fin_agent::config::AppConfig;
use fin_agent::inference::{InferenceClient, MockInferenceClient};
use fin_agent::sources::{HoldingsSource, MockNewsData, MockUserDb, QuoteSource, StaticQuoteSource};
use fin_agent::{Dispatcher, Holding, IssueKind, MarketQuote, PipelineStage, Severity};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingQuotes {
    inner: StaticQuoteSource,
    calls: AtomicUsize,
}

#[async_trait]
impl QuoteSource for CountingQuotes {
    async fn get_quote(&self, ticker: &str) -> MarketQuote {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_quote(ticker).await
    }
}

struct CountingHoldings {
    inner: MockUserDb,
    calls: AtomicUsize,
}

#[async_trait]
impl HoldingsSource for CountingHoldings {
    async fn get_holdings(&self, user_id: &str) -> fin_agent::Result<Vec<Holding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_holdings(user_id).await
    }
}

struct CountingInference {
    inner: MockInferenceClient,
    calls: AtomicUsize,
}

#[async_trait]
impl InferenceClient for CountingInference {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str, system_instruction: Option<&str>) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(prompt, system_instruction).await
    }
}

struct Harness {
    dispatcher: Dispatcher,
    holdings: Arc<CountingHoldings>,
    quotes: Arc<CountingQuotes>,
    inference: Arc<CountingInference>,
}

fn harness(narrative: &str) -> Harness {
    let holdings = Arc::new(CountingHoldings {
        inner: MockUserDb::new(),
        calls: AtomicUsize::new(0),
    });
    let quotes = Arc::new(CountingQuotes {
        inner: StaticQuoteSource::demo(),
        calls: AtomicUsize::new(0),
    });
    let inference = Arc::new(CountingInference {
        inner: MockInferenceClient::with_response(narrative),
        calls: AtomicUsize::new(0),
    });

    let dispatcher = Dispatcher::new(
        AppConfig::default(),
        holdings.clone(),
        quotes.clone(),
        Arc::new(MockNewsData::new()),
        inference.clone(),
    );

    Harness {
        dispatcher,
        holdings,
        quotes,
        inference,
    }
}

#[tokio::test]
async fn demo_portfolio_totals_match_ground_truth() {
    let h = harness("irrelevant");
    let outcome = h.dispatcher.handle_request("user_001", "How is Tencent doing?").await.unwrap();

    let pnl = outcome.pnl.unwrap();
    assert_eq!(pnl.total_pnl, dec!(5050));
    assert_eq!(pnl.total_return_rate, "13.65%");
    let per_position: Vec<_> = pnl.details.iter().map(|d| d.pnl).collect();
    assert_eq!(per_position, vec![dec!(4500), dec!(250), dec!(300)]);

    assert_eq!(h.quotes.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.inference.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn grounded_narrative_passes_every_check() {
    let h = harness(
        "Total PnL: 5050.0. Total return: 13.65%. 0700.HK contributed most.\n\nRisk Disclaimer: markets carry risk.",
    );
    let outcome = h.dispatcher.handle_request("user_001", "Summarize my account").await.unwrap();

    assert_eq!(outcome.stage, PipelineStage::Done);
    assert!(outcome.verified);

    let consistency = outcome.consistency.unwrap();
    assert!(consistency.is_consistent);
    assert!(consistency.issues.iter().all(|i| i.severity == Severity::Pass));
}

#[tokio::test]
async fn substituted_total_is_flagged_but_still_returned() {
    let narrative =
        "Total PnL: 10000.0. Total return: 13.65%. 0700.HK contributed most. Risk Disclaimer: markets carry risk.";
    let h = harness(narrative);
    let outcome = h.dispatcher.handle_request("user_001", "Summarize my account").await.unwrap();

    assert_eq!(outcome.stage, PipelineStage::Done);
    assert!(!outcome.verified);

    let consistency = outcome.consistency.unwrap();
    assert!(consistency.has_failure(IssueKind::MissingPnl));
    assert!(outcome.response.starts_with(narrative));
    assert!(outcome.response.len() > narrative.len());
}

#[tokio::test]
async fn forbidden_term_short_circuits_the_pipeline() {
    let h = harness("unused");
    let outcome = h
        .dispatcher
        .handle_request("user_001", "Give me insider information on BABA")
        .await
        .unwrap();

    assert!(outcome.is_rejected());
    assert_eq!(outcome.response, "Sensitive term detected: insider");
    assert!(outcome.pnl.is_none());
    assert!(outcome.prompt_digest.is_none());

    assert_eq!(h.holdings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.quotes.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.inference.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn final_text_always_carries_a_disclaimer() {
    let h = harness("The portfolio went up.");
    let outcome = h.dispatcher.handle_request("user_001", "How did I do?").await.unwrap();

    assert!(outcome.response.contains("Risk Disclaimer"));
    assert!(!outcome.verified);
}

#[tokio::test]
async fn same_inputs_give_same_prompt_digest() {
    let first = harness("x");
    let second = harness("x");

    // Sentiment is drawn at random, so the documents are pinned by filtering them out
    let mut config = AppConfig::default();
    config.retrieval.min_relevance = Some(1.0);
    let pinned = |h: Harness| {
        Dispatcher::new(
            config.clone(),
            h.holdings,
            h.quotes,
            Arc::new(MockNewsData::new()),
            h.inference,
        )
    };

    let a = pinned(first).handle_request("user_001", "q").await.unwrap();
    let b = pinned(second).handle_request("user_001", "q").await.unwrap();

    assert!(a.documents.is_empty());
    assert_eq!(a.prompt_digest, b.prompt_digest);
    assert_ne!(a.request_id, b.request_id);
}
