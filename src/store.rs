//! Durable token cache and device-modification history.
//!
//! The access-token table is a single-slot cache: zero or one row, ever.
//! Refresh overwrites the row in place through one atomic upsert, so two
//! processes racing a refresh can only ever leave one surviving document
//! (the last write wins; the loser's mint is discarded).
//!
//! Device-change records are the opposite shape: append-only history,
//! inserted on every successful status write or command and never read
//! back by this crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::token::AccessToken;

/// Whether a token save landed as a fresh document or overwrote the
/// existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

/// The two device-modifying operations the bridge performs on behalf of
/// the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAction {
    ModifyStatus,
    SendCommand,
}

impl DeviceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceAction::ModifyStatus => "modifyStatus",
            DeviceAction::SendCommand => "sendCommand",
        }
    }
}

/// One audit entry per successful device modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceChangeRecord {
    pub action: DeviceAction,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    /// The status map or command set that was sent, verbatim.
    pub detail: serde_json::Value,
    pub modified_time: DateTime<Utc>,
}

/// Persistence boundary consumed by the token manager and the API facade.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The sole cached token document, or `None` when the slot is empty.
    async fn fetch_access_token(&self) -> Result<Option<AccessToken>, BridgeError>;

    /// Insert when the slot is empty, overwrite in place when it is not.
    /// Exactly one document survives any successful save.
    async fn save_access_token(&self, token: &AccessToken) -> Result<SaveOutcome, BridgeError>;

    /// Append one audit entry; never updates.
    async fn save_device_change_record(
        &self,
        record: &DeviceChangeRecord,
    ) -> Result<(), BridgeError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, run migrations, and wrap the pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn fetch_access_token(&self) -> Result<Option<AccessToken>, BridgeError> {
        let row = sqlx::query(
            "SELECT access_token, expires_in, created_time, expired_time \
             FROM wukoon_access_token",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AccessToken {
            access_token: row.try_get("access_token")?,
            expires_in: row.try_get("expires_in")?,
            created_time: row.try_get("created_time")?,
            expired_time: row.try_get("expired_time")?,
        }))
    }

    async fn save_access_token(&self, token: &AccessToken) -> Result<SaveOutcome, BridgeError> {
        // `xmax = 0` is true only when the insert arm ran; the fixed
        // primary key makes the upsert the whole single-document guarantee.
        let row = sqlx::query(
            "INSERT INTO wukoon_access_token \
                 (id, access_token, expires_in, created_time, expired_time) \
             VALUES (TRUE, $1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                 access_token = EXCLUDED.access_token, \
                 expires_in = EXCLUDED.expires_in, \
                 created_time = EXCLUDED.created_time, \
                 expired_time = EXCLUDED.expired_time \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&token.access_token)
        .bind(token.expires_in)
        .bind(token.created_time)
        .bind(token.expired_time)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        debug!(inserted, "saved wukoon access token");

        Ok(if inserted {
            SaveOutcome::Inserted
        } else {
            SaveOutcome::Updated
        })
    }

    async fn save_device_change_record(
        &self,
        record: &DeviceChangeRecord,
    ) -> Result<(), BridgeError> {
        let result = sqlx::query(
            "INSERT INTO wukoon_dev_modify_record \
                 (action, device_id, detail, modified_time) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(record.action.as_str())
        .bind(&record.device_id)
        .bind(&record.detail)
        .bind(record.modified_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(BridgeError::StoreInconsistency {
                written: result.rows_affected(),
            });
        }

        debug!(device_id = %record.device_id, action = record.action.as_str(), "saved device change record");
        Ok(())
    }
}
