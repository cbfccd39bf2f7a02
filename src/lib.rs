pub mod analytics;
pub mod assembler;
pub mod backfill;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod model;
pub mod parser;
pub mod projector;
pub mod request;
pub mod server;
pub mod upstream;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::analytics::FeedEvent;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::fanout::FeedPlan;
use crate::model::{ChatEnvelope, FeedEnvelope, FeedKind, FeedRequest, Section};
use crate::request::ClientParams;
use crate::upstream::network::{
    HttpBackfill, HttpEventSink, HttpPhotoResolver, HttpTokenVerifier, HttpUpstream,
};
use crate::upstream::{BackfillSink, EventSink, PhotoResolver, ShardRegistry, TokenVerifier};

/// Long-lived dependencies of every request. Built once, never mutated.
pub struct FeedContext {
    pub config: FeedConfig,
    pub shards: ShardRegistry,
    pub photos: Arc<dyn PhotoResolver>,
    pub backfill: Arc<dyn BackfillSink>,
    pub events: Arc<dyn EventSink>,
    pub auth: Arc<dyn TokenVerifier>,
}

impl fmt::Debug for FeedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedContext")
            .field("addr", &self.config.addr)
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl FeedContext {
    /// HTTP collaborators for every configured endpoint, sharing one pool.
    pub fn connect(config: FeedConfig) -> Result<Self, FeedError> {
        let upstream = HttpUpstream::new(config.upstream_timeout)?;
        let endpoints = &config.endpoints;

        Ok(Self {
            shards: ShardRegistry::from_endpoints(endpoints, &upstream),
            photos: Arc::new(HttpPhotoResolver::new(endpoints.photos.clone(), upstream.clone())),
            backfill: Arc::new(HttpBackfill::new(endpoints.backfill.clone(), upstream.clone())),
            events: Arc::new(HttpEventSink::new(endpoints.events.clone(), upstream.clone())),
            auth: Arc::new(HttpTokenVerifier::new(endpoints.auth.clone(), upstream)),
            config,
        })
    }
}

/// Body of a successful feed call.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FeedResponse {
    Feed(FeedEnvelope),
    Chat(ChatEnvelope),
}

#[derive(Clone, Debug)]
pub struct FeedService {
    ctx: Arc<FeedContext>,
}

impl FeedService {
    pub fn new(ctx: Arc<FeedContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<FeedContext> {
        &self.ctx
    }

    /// Validates, authenticates and serves one client call.
    pub async fn serve(
        &self,
        kind: FeedKind,
        params: ClientParams,
        source_ip: Option<String>,
    ) -> Result<FeedResponse, FeedError> {
        let token = params.check_required(kind)?.to_string();
        let user_id = self.ctx.auth.verify(&token).await?;
        let mut request = params.into_request(kind, user_id, &self.ctx.config.limits)?;
        request.source_ip = source_ip;

        match kind {
            FeedKind::Chat => self.chat(request).await.map(FeedResponse::Chat),
            _ => self.feed(request).await.map(FeedResponse::Feed),
        }
    }

    /// Serves any list-shaped feed.
    pub async fn feed(&self, request: FeedRequest) -> Result<FeedEnvelope, FeedError> {
        let span = info_span!("feed", kind = request.kind.as_str(), request_id = %request.request_id);
        self.feed_inner(Arc::new(request)).instrument(span).await
    }

    async fn feed_inner(&self, request: Arc<FeedRequest>) -> Result<FeedEnvelope, FeedError> {
        let started = Instant::now();
        let plan = FeedPlan::for_kind(request.kind);
        let aggregated = fanout::aggregate(self.ctx.clone(), request.clone(), &plan).await?;

        if request.kind == FeedKind::NewFaces {
            let limit = request.limit.unwrap_or(self.ctx.config.limits.new_faces_default);
            backfill::maybe_trigger_backfill(
                self.ctx.backfill.clone(),
                &request.user_id,
                aggregated.raw_count(),
                limit,
                aggregated.proceeded(),
            );
        }

        let envelope = aggregated.envelope;
        analytics::emit(self.ctx.events.clone(), FeedEvent::from_envelope(&request, &envelope));

        let summary: Vec<String> = envelope
            .sections
            .iter()
            .map(|(section, profiles)| format!("{}={}", section.as_str(), profiles.len()))
            .collect();
        info!(
            "successfully returned [{}] for userId [{}], repeatRequestAfter [{}], took [{}] millis",
            summary.join(", "),
            request.user_id,
            envelope.repeat_request_after,
            started.elapsed().as_millis()
        );

        Ok(envelope)
    }

    /// Serves the single-conversation chat feed.
    pub async fn chat(&self, request: FeedRequest) -> Result<ChatEnvelope, FeedError> {
        let span = info_span!("feed", kind = request.kind.as_str(), request_id = %request.request_id);
        self.chat_inner(Arc::new(request)).instrument(span).await
    }

    async fn chat_inner(&self, request: Arc<FeedRequest>) -> Result<ChatEnvelope, FeedError> {
        let started = Instant::now();
        let plan = FeedPlan::for_kind(FeedKind::Chat);
        let aggregated = fanout::aggregate(self.ctx.clone(), request.clone(), &plan).await?;

        let chat_exists = aggregated.chat_exists();
        let mut envelope = aggregated.envelope;
        let chat = envelope
            .sections
            .remove(&Section::Chat)
            .and_then(|profiles| profiles.into_iter().next())
            .unwrap_or_default();

        let response = ChatEnvelope {
            chat,
            chat_exists,
            repeat_request_after: aggregated.decision.repeat_after(),
            pull_again_after: self.ctx.config.repeat.chat_pull_again,
        };
        analytics::emit(self.ctx.events.clone(), FeedEvent::from_chat(&request, &response));

        info!(
            "successfully returned chat with [{}] for userId [{}], chatExists [{}], repeatRequestAfter [{}], took [{}] millis",
            request.opposite_user_id.as_deref().unwrap_or_default(),
            request.user_id,
            response.chat_exists,
            response.repeat_request_after,
            started.elapsed().as_millis()
        );

        Ok(response)
    }
}
