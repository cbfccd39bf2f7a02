use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::config::Limits;
use crate::error::FeedError;
use crate::model::{FeedFilter, FeedKind, FeedRequest, Resolution, BIGGEST_DEFAULT_RESOLUTION};

pub const HEALTH_CHECK_AGENT: &str = "ELB-HealthChecker";

pub const KNOWN_SOURCES: [&str; 12] = [
    "new_faces",
    "discover",
    "who_liked_me",
    "matches",
    "messages",
    "hellos",
    "inbox",
    "sent",
    "lc_likes",
    "lc_messages",
    "chat",
    "profile",
];

pub fn is_health_check(user_agent: Option<&str>) -> bool {
    user_agent.map_or(false, |agent| agent.starts_with(HEALTH_CHECK_AGENT))
}

/// Unsupported sizes fall back to the biggest default instead of failing.
pub fn resolve_resolution(raw: &str) -> Resolution {
    raw.parse().unwrap_or_else(|_| {
        warn!("unsupported resolution [{}], using [{}]", raw, BIGGEST_DEFAULT_RESOLUTION);
        BIGGEST_DEFAULT_RESOLUTION
    })
}

/// Parameters exactly as the client sent them, nothing checked yet.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientParams {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub last_action_time: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub filter: Option<FeedFilter>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn parse_number(params: &HashMap<String, String>, key: &str) -> Result<Option<i64>, FeedError> {
    params
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| FeedError::WrongParams(format!("{} is not a number", key)))
        })
        .transpose()
}

impl ClientParams {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, FeedError> {
        Ok(Self {
            access_token: params.get("accessToken").cloned(),
            resolution: params.get("resolution").cloned(),
            last_action_time: parse_number(params, "lastActionTime")?,
            limit: parse_number(params, "limit")?,
            filter: None,
            source: params.get("source").cloned(),
            user_id: params.get("userId").cloned(),
        })
    }

    pub fn from_json(body: &[u8]) -> Result<Self, FeedError> {
        if body.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| FeedError::WrongParams(format!("body: {}", e)))
    }

    /// Checks what must be present before the token is even looked at.
    pub fn check_required(&self, kind: FeedKind) -> Result<&str, FeedError> {
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeedError::WrongParams("accessToken is missing".into()))?;

        if self.resolution.as_deref().map_or(true, str::is_empty) {
            return Err(FeedError::WrongParams("resolution is missing".into()));
        }
        match self.last_action_time {
            Some(t) if t >= 0 => {}
            Some(t) => return Err(FeedError::WrongParams(format!("lastActionTime [{}] is negative", t))),
            None => return Err(FeedError::WrongParams("lastActionTime is missing".into())),
        }
        if kind == FeedKind::Chat && self.user_id.as_deref().map_or(true, str::is_empty) {
            return Err(FeedError::WrongParams("userId is missing".into()));
        }
        if kind == FeedKind::Lc && self.source.as_deref().map_or(true, str::is_empty) {
            return Err(FeedError::WrongParams("source is missing".into()));
        }
        if let Some(source) = self.source.as_deref() {
            if !source.is_empty() && !KNOWN_SOURCES.contains(&source) {
                return Err(FeedError::WrongParams(format!("unknown source [{}]", source)));
            }
        }

        Ok(token)
    }

    /// Builds the validated request for the authenticated `user_id`.
    pub fn into_request(self, kind: FeedKind, user_id: String, limits: &Limits) -> Result<FeedRequest, FeedError> {
        self.check_required(kind)?;

        let resolution = resolve_resolution(self.resolution.as_deref().unwrap_or_default());
        let watermark = self.last_action_time.unwrap_or_default();
        let mut request = FeedRequest::new(kind, user_id, watermark, resolution);

        if matches!(kind, FeedKind::NewFaces | FeedKind::Discover) {
            request.limit = Some(limits.clamp_new_faces(self.limit));
        }
        if kind == FeedKind::Discover {
            request.filter = Some(self.filter.unwrap_or_default().normalized());
        }
        request.source = self.source.filter(|s| !s.is_empty());
        request.opposite_user_id = self.user_id.filter(|_| kind == FeedKind::Chat);

        Ok(request)
    }
}
