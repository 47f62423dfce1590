use std::time::Duration;

use reqwest::StatusCode;

/// Everything that can fail between the token core, the Wukoon platform
/// and the durable store.
///
/// The platform reports failure through an `errcode` field in an otherwise
/// successful HTTP response; those rejections keep the platform's payload
/// intact so callers can inspect the code (20013 means the platform
/// considers the token expired or invalid).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("wukoon rejected the request: errcode {errcode} ({errmsg})")]
    Platform { errcode: i64, errmsg: String },

    #[error("transport failure reaching wukoon")]
    Transport(#[from] reqwest::Error),

    #[error("wukoon did not answer within {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("wukoon returned HTTP {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("malformed wukoon response: {detail}")]
    Decode { detail: String },

    #[error("token store failure")]
    Store(#[from] sqlx::Error),

    #[error("token store wrote {written} documents where exactly one was expected")]
    StoreInconsistency { written: u64 },
}

impl BridgeError {
    /// Platform error code, when the failure was a platform-level rejection.
    pub fn platform_errcode(&self) -> Option<i64> {
        match self {
            BridgeError::Platform { errcode, .. } => Some(*errcode),
            _ => None,
        }
    }
}
