use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{ChatEnvelope, FeedEnvelope, FeedKind, FeedRequest, Section};
use crate::projector::now_millis;
use crate::upstream::EventSink;

pub fn event_type(kind: FeedKind) -> &'static str {
    match kind {
        FeedKind::NewFaces => "FEEDS_NEW_FACES_SEEN_PROFILES",
        FeedKind::Discover => "FEEDS_DISCOVER_SEEN_PROFILES",
        FeedKind::Lmm => "FEEDS_LMM_SEEN_PROFILES",
        FeedKind::Lmhis => "FEEDS_LMHIS_SEEN_PROFILES",
        FeedKind::Lc => "FEEDS_LC_SEEN_PROFILES",
        FeedKind::Chat => "FEEDS_CHAT_RETURNED",
    }
}

/// What one response handed to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub event_type: &'static str,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub counts: BTreeMap<&'static str, usize>,
    pub repeat_request_after: i64,
    pub unix_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_ids: Option<Vec<String>>,
}

impl FeedEvent {
    fn base(request: &FeedRequest, repeat_request_after: i64) -> Self {
        Self {
            event_type: event_type(request.kind),
            user_id: request.user_id.clone(),
            source_ip: request.source_ip.clone(),
            source: request.source.clone(),
            counts: BTreeMap::new(),
            repeat_request_after,
            unix_time: now_millis(),
            target_user_ids: None,
        }
    }

    pub fn from_envelope(request: &FeedRequest, envelope: &FeedEnvelope) -> Self {
        let mut event = Self::base(request, envelope.repeat_request_after);
        for (section, profiles) in &envelope.sections {
            event.counts.insert(section.as_str(), profiles.len());
        }
        if request.kind == FeedKind::NewFaces {
            event.target_user_ids = Some(
                envelope
                    .section(Section::Profiles)
                    .iter()
                    .map(|p| p.user_id.clone())
                    .collect(),
            );
        }
        event
    }

    pub fn from_chat(request: &FeedRequest, envelope: &ChatEnvelope) -> Self {
        let mut event = Self::base(request, envelope.repeat_request_after);
        let returned = usize::from(!envelope.chat.user_id.is_empty());
        event.counts.insert(Section::Chat.as_str(), returned);
        event
    }
}

/// Ships the event in the background. The response never waits for it.
pub fn emit(sink: Arc<dyn EventSink>, event: FeedEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let event_type = event.event_type;
        let user_id = event.user_id.clone();
        match sink.send(event).await {
            Ok(()) => debug!("{} sent for userId [{}]", event_type, user_id),
            Err(e) => warn!("{} for userId [{}] not sent: {}", event_type, user_id, e),
        }
    })
}
