use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DATABASE_URL: &str = "postgres:///wukoon_bridge";

/// Wukoon application settings, read from the environment.
///
/// The platform assigns one appId/appSecret pair per product model, so a
/// deployment that talks to several models runs one bridge per pair.
#[derive(Debug, Clone)]
pub struct WukoonConfig {
    /// Base URL of the Wukoon cloud API, without a trailing slash.
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Upper bound on any single outbound call to the platform.
    pub request_timeout: Duration,
    pub database_url: String,
}

impl WukoonConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("WUKOON_BASE_URL").context("WUKOON_BASE_URL is not set")?;
        let app_id = std::env::var("WUKOON_APP_ID").context("WUKOON_APP_ID is not set")?;
        let app_secret =
            std::env::var("WUKOON_APP_SECRET").context("WUKOON_APP_SECRET is not set")?;

        let request_timeout = match std::env::var("WUKOON_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("WUKOON_REQUEST_TIMEOUT_SECS is not a number: {raw}"))?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            base_url,
            app_id,
            app_secret,
            request_timeout,
            database_url,
        })
    }
}
