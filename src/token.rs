//! Wukoon access-token lifecycle.
//!
//! Every outbound call to the platform needs a bearer token that the
//! platform mints on demand and expires after `expireIn` seconds. The
//! manager keeps one copy in memory, falls back to the durable store copy
//! on cold start, and mints a replacement when both are stale or absent.
//!
//! The whole check → mint → persist → cache sequence runs under a single
//! async mutex, so concurrent callers that observe a stale token wait for
//! the in-flight refresh instead of issuing duplicate mint calls against
//! the platform. Cross-process duplication is only bounded by the store's
//! atomic upsert (one document, not one mint); replicas may still race
//! each other to the token endpoint.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::store::TokenStore;
use crate::wukoon::{TokenFetcher, TokenGrant};

/// Tokens are considered expired this many seconds before the platform's
/// own deadline, so a token handed out here is never mid-flight when the
/// platform invalidates it.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// A minted bearer token together with its expiry bookkeeping.
///
/// Field names follow the stored document:
/// `{accessToken, expiresIn, createdTime, expiredTime}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds as reported by the platform at mint time.
    pub expires_in: i64,
    pub created_time: DateTime<Utc>,
    /// Computed deadline: `created_time + (expires_in - 60s)`.
    pub expired_time: DateTime<Utc>,
}

impl AccessToken {
    /// Stamp a fresh grant with its creation instant and early-refresh
    /// deadline.
    pub fn from_grant(grant: &TokenGrant, minted_at: DateTime<Utc>) -> Self {
        let expired_time =
            minted_at + Duration::seconds(grant.expire_in - REFRESH_MARGIN_SECS);
        Self {
            access_token: grant.access_token.clone(),
            expires_in: grant.expire_in,
            created_time: minted_at,
            expired_time,
        }
    }

    /// Strict comparison: a token whose deadline is exactly `at` is still
    /// usable for this one check.
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.expired_time
    }
}

/// Owns the in-memory token and coordinates refreshes against the store
/// and the platform.
///
/// Construct one per process and share it (`Arc`) with every caller that
/// needs a credential; the manager is the only writer of both the
/// in-memory copy and the store document.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    fetcher: Arc<dyn TokenFetcher>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            store,
            fetcher,
            cached: Mutex::new(None),
        }
    }

    /// Return a token that is valid at the moment it is returned, minting
    /// a new one from the platform if necessary.
    ///
    /// On a failed mint or persist the error propagates to the caller and
    /// neither the in-memory nor the stored token is touched; there are no
    /// internal retries.
    pub async fn get_valid_token(&self) -> Result<AccessToken, BridgeError> {
        // One guard across the whole refresh sequence: callers that lose
        // the race wait here and then see the freshly cached token.
        let mut slot = self.cached.lock().await;

        if let Some(token) = slot.as_ref() {
            if !token.is_expired_at(Utc::now()) {
                debug!("using in-memory access token");
                return Ok(token.clone());
            }
            debug!(expired_time = %token.expired_time, "in-memory access token is stale");
        } else {
            // Cold start: the durable copy may have outlived a restart.
            match self.store.fetch_access_token().await? {
                Some(token) if !token.is_expired_at(Utc::now()) => {
                    debug!(expired_time = %token.expired_time, "adopting stored access token");
                    *slot = Some(token.clone());
                    return Ok(token);
                }
                Some(token) => {
                    debug!(expired_time = %token.expired_time, "stored access token is stale");
                }
                None => debug!("no access token in store yet"),
            }
        }

        let grant = self.fetcher.mint_token().await?;
        let token = AccessToken::from_grant(&grant, Utc::now());
        let outcome = self.store.save_access_token(&token).await?;
        info!(?outcome, expired_time = %token.expired_time, "refreshed wukoon access token");

        *slot = Some(token.clone());
        Ok(token)
    }
}
