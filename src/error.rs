use serde::Serialize;
use thiserror::Error;

use crate::model::ShardKind;

/// Failure of any call across the upstream boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("{service} unreachable: {reason}")]
    Transport { service: String, reason: String },

    #[error("{service} answered HTTP {status}")]
    Status { service: String, status: u16 },

    #[error("{service} sent an unreadable body: {reason}")]
    Decode { service: String, reason: String },
}

impl UpstreamError {
    pub fn service(&self) -> &str {
        match self {
            UpstreamError::Transport { service, .. }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. } => service,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Wrong request params: {0}")]
    WrongParams(String),

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Upstream {shard} unavailable: {reason}")]
    Upstream { shard: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedError {
    pub fn shard(shard: ShardKind, err: UpstreamError) -> Self {
        FeedError::Upstream {
            shard: shard.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            FeedError::WrongParams(_) => ErrorBody::new("WrongParamsClientError", "Wrong request params"),
            FeedError::InvalidAccessToken => {
                ErrorBody::new("InvalidAccessTokenClientError", "Invalid access token")
            }
            FeedError::Upstream { .. } | FeedError::Internal(_) => {
                ErrorBody::new("InternalServerError", "Internal Server Error")
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, FeedError::WrongParams(_) | FeedError::InvalidAccessToken)
    }
}

impl From<UpstreamError> for FeedError {
    fn from(err: UpstreamError) -> Self {
        FeedError::Upstream {
            shard: err.service().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Error payload returned to clients with HTTP 200.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: &'static str,
    pub error_message: &'static str,
}

impl ErrorBody {
    fn new(error_code: &'static str, error_message: &'static str) -> Self {
        Self { error_code, error_message }
    }
}
