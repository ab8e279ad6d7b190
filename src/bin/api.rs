use islamic_finance_advisor::{api::start_server, store::build_store, Advisor, AdvisorConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(AdvisorConfig::from_env()?);
    let port = config.port;

    info!("🚀 Islamic Finance Advisor - API Server");
    info!("📍 Port: {}", port);

    let store = build_store();
    let advisor = Arc::new(Advisor::from_config(config, store)?);

    info!("✅ Advisor initialized");
    info!("📡 Starting API server...");

    start_server(advisor, port).await?;

    Ok(())
}
