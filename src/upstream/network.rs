use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::analytics::FeedEvent;
use crate::config::Endpoints;
use crate::error::{FeedError, UpstreamError};
use crate::model::{ShardKind, ShardResult};
use crate::projector::PhotoUrls;
use crate::upstream::types::{
    AuthRequest, AuthResponse, PhotoBatch, PhotoUrlsResponse, PrepareRequest, ShardRequest, ShardResponse,
};
use crate::upstream::{BackfillSink, EventSink, PhotoResolver, ShardClient, ShardRegistry, TokenVerifier};

/// Pooled HTTP transport shared by every upstream client.
#[derive(Clone, Debug)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Internal(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn post<Req>(&self, service: &str, url: &str, req: &Req) -> Result<reqwest::Response, UpstreamError>
    where
        Req: Serialize + ?Sized,
    {
        let resp = self
            .client
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                service: service.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Status {
                service: service.to_string(),
                status: resp.status().as_u16(),
            });
        }

        Ok(resp)
    }

    pub async fn send_post<Req, Resp>(&self, service: &str, url: &str, req: &Req) -> Result<Resp, UpstreamError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let resp = self.post(service, url, req).await?;
        resp.json::<Resp>().await.map_err(|e| UpstreamError::Decode {
            service: service.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fire a request whose body is not read.
    pub async fn send_post_discard<Req>(&self, service: &str, url: &str, req: &Req) -> Result<(), UpstreamError>
    where
        Req: Serialize + ?Sized,
    {
        self.post(service, url, req).await.map(|_| ())
    }
}

// --- SHARDS ---

pub struct HttpShardClient {
    kind: ShardKind,
    url: String,
    upstream: HttpUpstream,
}

impl HttpShardClient {
    pub fn new(kind: ShardKind, url: impl Into<String>, upstream: HttpUpstream) -> Self {
        Self {
            kind,
            url: url.into(),
            upstream,
        }
    }
}

#[async_trait]
impl ShardClient for HttpShardClient {
    fn kind(&self) -> ShardKind {
        self.kind
    }

    async fn fetch(&self, request: &ShardRequest) -> Result<ShardResult, UpstreamError> {
        debug!("({}) POST {} for userId [{}]", self.kind, self.url, request.user_id);
        let response: ShardResponse = self.upstream.send_post(self.kind.as_str(), &self.url, request).await?;
        Ok(response.into_result(self.kind))
    }
}

impl ShardRegistry {
    pub fn from_endpoints(endpoints: &Endpoints, upstream: &HttpUpstream) -> Self {
        let mut registry = ShardRegistry::new();
        for (kind, url) in &endpoints.shards {
            registry.register(Arc::new(HttpShardClient::new(*kind, url.clone(), upstream.clone())));
        }
        registry
    }
}

// --- SERVICES ---

pub struct HttpPhotoResolver {
    url: String,
    upstream: HttpUpstream,
}

impl HttpPhotoResolver {
    pub fn new(url: impl Into<String>, upstream: HttpUpstream) -> Self {
        Self { url: url.into(), upstream }
    }
}

#[async_trait]
impl PhotoResolver for HttpPhotoResolver {
    async fn resolve(&self, batch: &PhotoBatch) -> Result<PhotoUrls, UpstreamError> {
        let response: PhotoUrlsResponse = self.upstream.send_post("photos", &self.url, batch).await?;
        Ok(response.url_by_user_id_photo_id_key)
    }
}

pub struct HttpBackfill {
    url: String,
    upstream: HttpUpstream,
}

impl HttpBackfill {
    pub fn new(url: impl Into<String>, upstream: HttpUpstream) -> Self {
        Self { url: url.into(), upstream }
    }
}

#[async_trait]
impl BackfillSink for HttpBackfill {
    async fn prepare(&self, user_id: &str) -> Result<(), UpstreamError> {
        let req = PrepareRequest { user_id: user_id.to_string() };
        self.upstream.send_post_discard("backfill", &self.url, &req).await
    }
}

pub struct HttpEventSink {
    url: String,
    upstream: HttpUpstream,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>, upstream: HttpUpstream) -> Self {
        Self { url: url.into(), upstream }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, event: FeedEvent) -> Result<(), UpstreamError> {
        self.upstream.send_post_discard("events", &self.url, &event).await
    }
}

pub struct HttpTokenVerifier {
    url: String,
    upstream: HttpUpstream,
}

impl HttpTokenVerifier {
    pub fn new(url: impl Into<String>, upstream: HttpUpstream) -> Self {
        Self { url: url.into(), upstream }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, access_token: &str) -> Result<String, FeedError> {
        let req = AuthRequest { access_token: access_token.to_string() };
        let response: AuthResponse = self.upstream.send_post("auth", &self.url, &req).await?;
        match response.user_id {
            Some(user_id) if response.valid && !user_id.is_empty() => Ok(user_id),
            _ => Err(FeedError::InvalidAccessToken),
        }
    }
}
