//! Credentials and connectivity check.
//!
//! Loads the environment, connects to the store, and requests one valid
//! access token, minting from the platform if the cached one is stale or
//! absent. Useful after deploying new appId/appSecret credentials, and as
//! a side effect it warms the durable token cache for the bridge proper.

use std::sync::Arc;

use tracing::info;

use wukoon_bridge::{PgTokenStore, TokenManager, WukoonClient, WukoonConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development); production provides environment
    // variables directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wukoon_bridge=info".into()),
        )
        .init();

    let config = WukoonConfig::from_env()?;
    let store = PgTokenStore::connect(&config.database_url).await?;
    let fetcher = WukoonClient::new(&config)?;
    let manager = TokenManager::new(Arc::new(store), Arc::new(fetcher));

    let token = manager.get_valid_token().await?;
    info!(
        created_time = %token.created_time,
        expired_time = %token.expired_time,
        "wukoon access token ready"
    );

    Ok(())
}
