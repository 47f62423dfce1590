//! End-to-end token lifecycle against a mock Wukoon platform.
//!
//! Exercises the real `WukoonClient` over HTTP (wiremock) with an
//! in-memory stand-in for the Postgres store.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wukoon_bridge::{
    AccessToken, BridgeError, DeviceChangeRecord, SaveOutcome, TokenManager, TokenStore,
    WukoonClient, WukoonConfig, REFRESH_MARGIN_SECS,
};

/// Single-slot store used in place of Postgres.
#[derive(Default)]
struct InMemoryStore {
    doc: StdMutex<Option<AccessToken>>,
    outcomes: StdMutex<Vec<SaveOutcome>>,
}

impl InMemoryStore {
    fn seeded(token: AccessToken) -> Self {
        let store = Self::default();
        *store.doc.lock().unwrap() = Some(token);
        store
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn fetch_access_token(&self) -> Result<Option<AccessToken>, BridgeError> {
        Ok(self.doc.lock().unwrap().clone())
    }

    async fn save_access_token(&self, token: &AccessToken) -> Result<SaveOutcome, BridgeError> {
        let mut doc = self.doc.lock().unwrap();
        let outcome = if doc.is_some() {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Inserted
        };
        *doc = Some(token.clone());
        self.outcomes.lock().unwrap().push(outcome);
        Ok(outcome)
    }

    async fn save_device_change_record(
        &self,
        _record: &DeviceChangeRecord,
    ) -> Result<(), BridgeError> {
        Ok(())
    }
}

fn config_for(server: &MockServer, timeout: Duration) -> WukoonConfig {
    WukoonConfig {
        base_url: server.uri(),
        app_id: "APPID".into(),
        app_secret: "APPSECRET".into(),
        request_timeout: timeout,
        database_url: "postgres:///unused".into(),
    }
}

fn manager_for(
    server: &MockServer,
    store: Arc<InMemoryStore>,
    timeout: Duration,
) -> TokenManager {
    let config = config_for(server, timeout);
    let client = WukoonClient::new(&config).unwrap();
    TokenManager::new(store, Arc::new(client))
}

fn stale_token(access_token: &str) -> AccessToken {
    let expired_time = Utc::now() - ChronoDuration::hours(1);
    AccessToken {
        access_token: access_token.into(),
        expires_in: 7200,
        created_time: expired_time - ChronoDuration::seconds(7140),
        expired_time,
    }
}

async fn mount_token_endpoint(server: &MockServer, body: serde_json::Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("type", "ACCESS_TOKEN"))
        .and(query_param("appId", "APPID"))
        .and(query_param("appSecret", "APPSECRET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn empty_store_mints_persists_and_returns() {
    let server = MockServer::start().await;
    mount_token_endpoint(
        &server,
        serde_json::json!({
            "errcode": 0,
            "errmsg": "ok",
            "accessToken": "abc",
            "expireIn": 7200
        }),
        1,
    )
    .await;

    let store = Arc::new(InMemoryStore::default());
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let before = Utc::now();
    let token = manager.get_valid_token().await.unwrap();
    let after = Utc::now();

    assert_eq!(token.access_token, "abc");
    assert_eq!(token.expires_in, 7200);
    assert!(token.created_time >= before && token.created_time <= after);
    assert_eq!(
        token.expired_time,
        token.created_time + ChronoDuration::seconds(7200 - REFRESH_MARGIN_SECS)
    );

    let doc = store.doc.lock().unwrap().clone().unwrap();
    assert_eq!(doc, token);
    assert_eq!(*store.outcomes.lock().unwrap(), vec![SaveOutcome::Inserted]);
}

#[tokio::test]
async fn stale_stored_token_is_replaced_in_place() {
    let server = MockServer::start().await;
    mount_token_endpoint(
        &server,
        serde_json::json!({
            "errcode": 0,
            "errmsg": "ok",
            "accessToken": "fresh-token",
            "expireIn": 7200
        }),
        1,
    )
    .await;

    let store = Arc::new(InMemoryStore::seeded(stale_token("old-token")));
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let token = manager.get_valid_token().await.unwrap();

    assert_eq!(token.access_token, "fresh-token");
    let doc = store.doc.lock().unwrap().clone().unwrap();
    assert_eq!(doc.access_token, "fresh-token");
    assert_eq!(*store.outcomes.lock().unwrap(), vec![SaveOutcome::Updated]);
}

#[tokio::test]
async fn fresh_stored_token_short_circuits_the_platform() {
    let server = MockServer::start().await;
    // Any hit on the token endpoint is a failure here.
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut stored = stale_token("still-good");
    stored.expired_time = Utc::now() + ChronoDuration::hours(1);
    let store = Arc::new(InMemoryStore::seeded(stored));
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let token = manager.get_valid_token().await.unwrap();

    assert_eq!(token.access_token, "still-good");
    assert!(store.outcomes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn platform_rejection_propagates_payload_and_skips_store() {
    let server = MockServer::start().await;
    mount_token_endpoint(
        &server,
        serde_json::json!({
            "errcode": 20013,
            "errmsg": "access token expired"
        }),
        1,
    )
    .await;

    let store = Arc::new(InMemoryStore::default());
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let err = manager.get_valid_token().await.unwrap_err();

    match err {
        BridgeError::Platform { errcode, errmsg } => {
            assert_eq!(errcode, 20013);
            assert_eq!(errmsg, "access token expired");
        }
        other => panic!("expected platform rejection, got {other:?}"),
    }
    assert!(store.doc.lock().unwrap().is_none());
    assert!(store.outcomes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn http_error_status_is_not_a_platform_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::default());
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let err = manager.get_valid_token().await.unwrap_err();

    match err {
        BridgeError::UnexpectedStatus { status, body } => {
            assert_eq!(status.as_u16(), 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("expected unexpected-status error, got {other:?}"),
    }
    assert!(store.doc.lock().unwrap().is_none());
}

#[tokio::test]
async fn slow_platform_surfaces_a_timeout_not_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "errcode": 0,
                    "errmsg": "ok",
                    "accessToken": "too-late",
                    "expireIn": 7200
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::default());
    let manager = manager_for(&server, store.clone(), Duration::from_millis(100));

    let err = manager.get_valid_token().await.unwrap_err();

    assert!(
        matches!(err, BridgeError::Timeout { .. }),
        "expected timeout, got {err:?}"
    );
    assert!(store.doc.lock().unwrap().is_none());
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    // errcode says success but the token fields are missing.
    mount_token_endpoint(
        &server,
        serde_json::json!({ "errcode": 0, "errmsg": "ok" }),
        1,
    )
    .await;

    let store = Arc::new(InMemoryStore::default());
    let manager = manager_for(&server, store.clone(), Duration::from_secs(5));

    let err = manager.get_valid_token().await.unwrap_err();

    assert!(
        matches!(err, BridgeError::Decode { .. }),
        "expected decode error, got {err:?}"
    );
    assert!(store.doc.lock().unwrap().is_none());
}
