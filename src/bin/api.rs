use fin_agent::{
    api::start_server,
    config::{api_port_from_env, AppConfig},
    sources::{HttpQuoteSource, MockNewsData, MockUserDb, QuoteSource, StaticQuoteSource},
    Dispatcher,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Loads .env as well
    let config = AppConfig::from_env()?;
    let api_port = api_port_from_env()?;

    info!("Portfolio analysis agent - API Server");
    info!("Port: {}", api_port);

    let quote_source: Arc<dyn QuoteSource> = match config.fetch.market_api_base_url.as_deref() {
        Some(base_url) => Arc::new(HttpQuoteSource::new(base_url)?),
        None => {
            warn!("MARKET_API_BASE_URL not set; using static demo quotes");
            Arc::new(StaticQuoteSource::demo())
        }
    };

    let dispatcher = Arc::new(Dispatcher::from_config(
        config,
        Arc::new(MockUserDb::new()),
        quote_source,
        Arc::new(MockNewsData::new()),
    ));

    info!(model = %dispatcher.inference_name(), "Dispatcher initialized");

    start_server(dispatcher, api_port).await?;

    Ok(())
}
