use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedgate::analytics::FeedEvent;
use feedgate::config::FeedConfig;
use feedgate::error::{FeedError, UpstreamError};
use feedgate::model::{RawPhoto, RawProfile, ShardKind, ShardResult};
use feedgate::projector::PhotoUrls;
use feedgate::upstream::types::{PhotoBatch, ShardRequest};
use feedgate::upstream::{BackfillSink, EventSink, PhotoResolver, ShardClient, ShardRegistry, TokenVerifier};
use feedgate::{FeedContext, FeedService};
use tokio::sync::mpsc;

pub const VIEWER: &str = "viewer";
pub const GOOD_TOKEN: &str = "good-token";

/// Shard that answers from a fixed script and records what it was asked.
pub struct ScriptedShard {
    kind: ShardKind,
    watermark: i64,
    profiles: Vec<RawProfile>,
    old_profiles: Vec<RawProfile>,
    total_count: Option<i64>,
    chat_exists: Option<bool>,
    fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<ShardRequest>>,
}

#[allow(dead_code)]
impl ScriptedShard {
    pub fn new(kind: ShardKind, watermark: i64, profiles: Vec<RawProfile>) -> Self {
        Self {
            kind,
            watermark,
            profiles,
            old_profiles: Vec::new(),
            total_count: None,
            chat_exists: None,
            fail: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: ShardKind) -> Self {
        let mut shard = Self::new(kind, 0, Vec::new());
        shard.fail = true;
        shard
    }

    /// Profiles served when the branch asks for the old partition.
    pub fn with_old(mut self, old_profiles: Vec<RawProfile>) -> Self {
        self.old_profiles = old_profiles;
        self
    }

    pub fn with_total(mut self, total: i64) -> Self {
        self.total_count = Some(total);
        self
    }

    pub fn with_chat_exists(mut self, exists: bool) -> Self {
        self.chat_exists = Some(exists);
        self
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn calls(&self) -> Vec<ShardRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShardClient for ScriptedShard {
    fn kind(&self) -> ShardKind {
        self.kind
    }

    async fn fetch(&self, request: &ShardRequest) -> Result<ShardResult, UpstreamError> {
        self.calls.lock().unwrap().push(request.clone());

        let delay = match (self.delay, request.request_new_part) {
            (Some(delay), Some(true)) | (Some(delay), None) => Some(delay),
            _ => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(UpstreamError::Status {
                service: self.kind.to_string(),
                status: 503,
            });
        }

        let profiles = match request.request_new_part {
            Some(false) => self.old_profiles.clone(),
            _ => self.profiles.clone(),
        };
        Ok(ShardResult {
            shard: self.kind,
            profiles,
            actual_watermark: self.watermark,
            total_count: self.total_count,
            chat_exists: self.chat_exists,
        })
    }
}

#[derive(Default)]
pub struct RecordingResolver {
    urls: PhotoUrls,
    fail: bool,
    batches: Mutex<Vec<PhotoBatch>>,
}

#[allow(dead_code)]
impl RecordingResolver {
    pub fn with_urls(urls: PhotoUrls) -> Self {
        Self {
            urls,
            fail: false,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<PhotoBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoResolver for RecordingResolver {
    async fn resolve(&self, batch: &PhotoBatch) -> Result<PhotoUrls, UpstreamError> {
        self.batches.lock().unwrap().push(batch.clone());
        if self.fail {
            return Err(UpstreamError::Transport {
                service: "photos".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.urls.clone())
    }
}

/// Records every call on the channel. With `fail` set it still records,
/// then answers like a broken upstream.
pub struct ChannelBackfill {
    tx: mpsc::UnboundedSender<String>,
    fail: bool,
}

#[async_trait]
impl BackfillSink for ChannelBackfill {
    async fn prepare(&self, user_id: &str) -> Result<(), UpstreamError> {
        self.tx.send(user_id.to_string()).map_err(|e| UpstreamError::Transport {
            service: "backfill".into(),
            reason: e.to_string(),
        })?;
        if self.fail {
            return Err(UpstreamError::Status { service: "backfill".into(), status: 500 });
        }
        Ok(())
    }
}

pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<FeedEvent>,
    fail: bool,
}

#[async_trait]
impl EventSink for ChannelEvents {
    async fn send(&self, event: FeedEvent) -> Result<(), UpstreamError> {
        self.tx.send(event).map_err(|e| UpstreamError::Transport {
            service: "events".into(),
            reason: e.to_string(),
        })?;
        if self.fail {
            return Err(UpstreamError::Status { service: "events".into(), status: 500 });
        }
        Ok(())
    }
}

/// Accepts exactly one token, issued to [`VIEWER`].
pub struct StaticTokens;

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, access_token: &str) -> Result<String, FeedError> {
        if access_token == GOOD_TOKEN {
            Ok(VIEWER.to_string())
        } else {
            Err(FeedError::InvalidAccessToken)
        }
    }
}

pub struct Harness {
    pub service: FeedService,
    pub resolver: Arc<RecordingResolver>,
    pub backfills: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
}

#[allow(dead_code)]
impl Harness {
    pub fn ctx(&self) -> Arc<FeedContext> {
        self.service.context().clone()
    }

    /// Waits for the next backfill signal, `None` if nothing arrives.
    pub async fn next_backfill(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_millis(500), self.backfills.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        tokio::time::timeout(Duration::from_millis(500), self.events.recv())
            .await
            .ok()
            .flatten()
    }
}

#[allow(dead_code)]
pub fn harness(shards: Vec<Arc<ScriptedShard>>) -> Harness {
    harness_with_urls(shards, PhotoUrls::new())
}

#[allow(dead_code)]
pub fn harness_with_urls(shards: Vec<Arc<ScriptedShard>>, urls: PhotoUrls) -> Harness {
    build(shards, RecordingResolver::with_urls(urls), false)
}

/// Photo resolver always fails.
#[allow(dead_code)]
pub fn harness_with_broken_photos(shards: Vec<Arc<ScriptedShard>>) -> Harness {
    build(shards, RecordingResolver::failing(), false)
}

/// Backfill and event sinks record the call, then fail.
#[allow(dead_code)]
pub fn harness_with_broken_sinks(shards: Vec<Arc<ScriptedShard>>) -> Harness {
    build(shards, RecordingResolver::default(), true)
}

fn build(shards: Vec<Arc<ScriptedShard>>, resolver: RecordingResolver, fail_sinks: bool) -> Harness {
    let mut registry = ShardRegistry::new();
    for shard in shards {
        registry.register(shard);
    }

    let resolver = Arc::new(resolver);
    let (backfill_tx, backfills) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();

    let ctx = FeedContext {
        config: FeedConfig::default(),
        shards: registry,
        photos: resolver.clone(),
        backfill: Arc::new(ChannelBackfill { tx: backfill_tx, fail: fail_sinks }),
        events: Arc::new(ChannelEvents { tx: events_tx, fail: fail_sinks }),
        auth: Arc::new(StaticTokens),
    };

    Harness {
        service: FeedService::new(Arc::new(ctx)),
        resolver,
        backfills,
        events,
    }
}

/// Profile with one photo the shard already linked.
#[allow(dead_code)]
pub fn linked(user_id: &str) -> RawProfile {
    RawProfile {
        user_id: user_id.to_string(),
        photos: vec![RawPhoto {
            photo_id: format!("{}-p1", user_id),
            link: Some(format!("http://img/{}/p1", user_id)),
            thumbnail_link: None,
        }],
        ..Default::default()
    }
}

/// Profile whose photos need the resolver.
#[allow(dead_code)]
pub fn unlinked(user_id: &str, photo_ids: &[&str]) -> RawProfile {
    RawProfile {
        user_id: user_id.to_string(),
        photos: photo_ids
            .iter()
            .map(|id| RawPhoto { photo_id: id.to_string(), ..Default::default() })
            .collect(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn ids(profiles: &[feedgate::model::Profile]) -> Vec<(&str, usize)> {
    profiles
        .iter()
        .map(|p| (p.user_id.as_str(), p.default_sorting_order_position))
        .collect()
}
