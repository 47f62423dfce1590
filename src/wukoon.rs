//! Wukoon platform client.
//!
//! The token core makes exactly one kind of outbound call: the mint
//! request `GET {base}/token?type=ACCESS_TOKEN&appId=…&appSecret=…`.
//! The platform signals failure through an `errcode` field in the JSON
//! body regardless of the HTTP status, so the body is decoded once here
//! into a tagged result before anything else sees it. `errcode == 0` is
//! the success discriminator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::WukoonConfig;
use crate::error::BridgeError;

const TOKEN_PATH: &str = "/token";
const TOKEN_TYPE: &str = "ACCESS_TOKEN";

/// A freshly minted token as the platform reports it, before expiry
/// bookkeeping is applied.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, from the `expireIn` response field.
    pub expire_in: i64,
}

/// Outbound capability the token manager depends on; production code uses
/// [`WukoonClient`].
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Ask the platform to mint a new access token. One attempt, no
    /// retries; a hung call is cut off by the configured request timeout.
    async fn mint_token(&self) -> Result<TokenGrant, BridgeError>;
}

/// Wire shape of the token endpoint response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenEndpointBody {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    expire_in: Option<i64>,
}

/// HTTP client for the Wukoon cloud API.
pub struct WukoonClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    timeout: Duration,
}

impl WukoonClient {
    pub fn new(config: &WukoonConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            timeout: config.request_timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::Timeout {
                elapsed: self.timeout,
            }
        } else {
            BridgeError::Transport(err)
        }
    }
}

#[async_trait]
impl TokenFetcher for WukoonClient {
    async fn mint_token(&self) -> Result<TokenGrant, BridgeError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        debug!(%url, "requesting wukoon access token");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("type", TOKEN_TYPE),
                ("appId", self.app_id.as_str()),
                ("appSecret", self.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!(%status, body = %body, "wukoon token endpoint HTTP error");
            return Err(BridgeError::UnexpectedStatus { status, body });
        }

        let decoded: TokenEndpointBody =
            serde_json::from_str(&body).map_err(|e| BridgeError::Decode {
                detail: format!("token endpoint body: {e}"),
            })?;

        if decoded.errcode != 0 {
            error!(
                errcode = decoded.errcode,
                errmsg = %decoded.errmsg,
                "wukoon rejected token request"
            );
            return Err(BridgeError::Platform {
                errcode: decoded.errcode,
                errmsg: decoded.errmsg,
            });
        }

        match (decoded.access_token, decoded.expire_in) {
            (Some(access_token), Some(expire_in)) => {
                debug!(expire_in, "wukoon access token minted");
                Ok(TokenGrant {
                    access_token,
                    expire_in,
                })
            }
            _ => Err(BridgeError::Decode {
                detail: "errcode 0 but accessToken/expireIn missing".into(),
            }),
        }
    }
}
