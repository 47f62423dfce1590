//! Integration bridge core for the Wukoon IoT cloud platform.
//!
//! The crate owns the access-token lifecycle that every outbound call to
//! the platform depends on: a [`TokenManager`] keeps one token in memory,
//! a [`TokenStore`] keeps the durable single-document copy, and a
//! [`TokenFetcher`] mints replacements from the platform's token endpoint.
//! Refreshes are single-flight within a process; concurrent callers share
//! one mint. It also persists the append-only device-modification history
//! the surrounding application writes on successful device operations.
//!
//! Webhook routing, payload validation and the per-endpoint device call
//! wrappers live outside this crate; they consume it through
//! [`TokenManager::get_valid_token`] and [`TokenStore`].

pub mod config;
pub mod error;
pub mod store;
pub mod token;
pub mod wukoon;

pub use config::WukoonConfig;
pub use error::BridgeError;
pub use store::{DeviceAction, DeviceChangeRecord, PgTokenStore, SaveOutcome, TokenStore};
pub use token::{AccessToken, TokenManager, REFRESH_MARGIN_SECS};
pub use wukoon::{TokenFetcher, TokenGrant, WukoonClient};
