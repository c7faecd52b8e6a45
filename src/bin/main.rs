use fin_agent::{
    config::AppConfig,
    engine::analyze_transactions,
    sources::{HttpQuoteSource, MockNewsData, MockUserDb, QuoteSource, StaticQuoteSource},
    Dispatcher,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_USER_ID: &str = "user_001";
const DEFAULT_QUERY: &str = "Analyze my portfolio performance today and explain the main drivers.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let user_id = args.next().unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    let query = {
        let rest: Vec<String> = args.collect();
        if rest.is_empty() {
            DEFAULT_QUERY.to_string()
        } else {
            rest.join(" ")
        }
    };

    let config = AppConfig::from_env()?;

    info!("Portfolio analysis agent starting");

    let user_db = Arc::new(MockUserDb::new());
    if let Some(behavior) = analyze_transactions(&user_db.get_recent_transactions(&user_id, 5)) {
        info!(
            transactions = behavior.total_transactions,
            style = ?behavior.trading_style,
            "Recent trading behavior"
        );
    }

    let quote_source: Arc<dyn QuoteSource> = match config.fetch.market_api_base_url.as_deref() {
        Some(base_url) => {
            info!(base_url = %base_url, "Using HTTP quote source");
            Arc::new(HttpQuoteSource::new(base_url)?)
        }
        None => {
            warn!("MARKET_API_BASE_URL not set; using static demo quotes");
            Arc::new(StaticQuoteSource::demo())
        }
    };

    let dispatcher = Dispatcher::from_config(
        config,
        user_db,
        quote_source,
        Arc::new(MockNewsData::new()),
    );

    info!(
        user_id = %user_id,
        model = %dispatcher.inference_name(),
        "Running dispatcher"
    );

    match dispatcher.handle_request(&user_id, &query).await {
        Ok(outcome) => {
            info!(
                request_id = %outcome.request_id,
                stage = %outcome.stage,
                verified = outcome.verified,
                "Request finished"
            );
            println!("{}", outcome.response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
