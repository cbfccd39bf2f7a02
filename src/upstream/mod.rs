pub mod network;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::analytics::FeedEvent;
use crate::error::{FeedError, UpstreamError};
use crate::model::{ShardKind, ShardResult};
use crate::projector::PhotoUrls;
use crate::upstream::types::{PhotoBatch, ShardRequest};

/// One upstream data shard. Shared by every branch of every request.
#[async_trait]
pub trait ShardClient: Send + Sync {
    fn kind(&self) -> ShardKind;

    async fn fetch(&self, request: &ShardRequest) -> Result<ShardResult, UpstreamError>;
}

#[async_trait]
pub trait PhotoResolver: Send + Sync {
    /// Resolved URIs keyed `"{userId}_{photoId}"`. Missing keys mean the
    /// photo is dropped, not that the call failed.
    async fn resolve(&self, batch: &PhotoBatch) -> Result<PhotoUrls, UpstreamError>;
}

#[async_trait]
pub trait BackfillSink: Send + Sync {
    async fn prepare(&self, user_id: &str) -> Result<(), UpstreamError>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: FeedEvent) -> Result<(), UpstreamError>;
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Returns the user id the token was issued to.
    async fn verify(&self, access_token: &str) -> Result<String, FeedError>;
}

/// Shard clients by kind.
#[derive(Clone, Default)]
pub struct ShardRegistry {
    clients: HashMap<ShardKind, Arc<dyn ShardClient>>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Arc<dyn ShardClient>) -> &mut Self {
        self.clients.insert(client.kind(), client);
        self
    }

    pub fn get(&self, kind: ShardKind) -> Result<Arc<dyn ShardClient>, FeedError> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| FeedError::Internal(format!("no client registered for shard {}", kind)))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
