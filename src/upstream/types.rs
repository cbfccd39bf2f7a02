use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{FeedFilter, RawProfile, Resolution, ShardKind, ShardResult};

/// Body of one shard call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShardRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub last_action_time: i64,
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_new_part: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmhis_part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opposite_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FeedFilter>,
}

impl ShardRequest {
    pub fn new(user_id: impl Into<String>, last_action_time: i64, resolution: Resolution) -> Self {
        Self {
            user_id: user_id.into(),
            limit: None,
            last_action_time,
            resolution,
            request_new_part: None,
            lmhis_part: None,
            opposite_user_id: None,
            filter: None,
        }
    }
}

/// Shard answer as it comes off the wire.
///
/// Shards name their lists differently; every known spelling lands in
/// `profiles`. The chat shard returns a single `profile` instead.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShardResponse {
    #[serde(default, alias = "newFaces", alias = "likesYou", alias = "matches", alias = "messages")]
    pub profiles: Vec<RawProfile>,
    #[serde(default)]
    pub profile: Option<RawProfile>,
    pub last_action_time: i64,
    #[serde(default, alias = "allProfilesNum")]
    pub total_count: Option<i64>,
    #[serde(default, alias = "isChatExists")]
    pub chat_exists: Option<bool>,
}

impl ShardResponse {
    pub fn into_result(self, shard: ShardKind) -> ShardResult {
        let mut profiles = self.profiles;
        if let Some(single) = self.profile {
            profiles.push(single);
        }
        ShardResult {
            shard,
            profiles,
            actual_watermark: self.last_action_time,
            total_count: self.total_count,
            chat_exists: self.chat_exists,
        }
    }
}

// --- PHOTO RESOLVER ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    pub photo_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoOwner {
    pub user_id: String,
    pub photos: Vec<PhotoRef>,
}

/// Photos a branch could not display from the shard record alone.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoBatch {
    pub resolution: Resolution,
    pub profiles: Vec<PhotoOwner>,
}

impl PhotoBatch {
    /// Collects every photo without an embedded link. `None` when there is
    /// nothing to resolve.
    pub fn unresolved(resolution: Resolution, profiles: &[RawProfile]) -> Option<Self> {
        let owners: Vec<PhotoOwner> = profiles
            .iter()
            .filter_map(|profile| {
                let photos: Vec<PhotoRef> = profile
                    .photos
                    .iter()
                    .filter(|photo| photo.link.is_none())
                    .map(|photo| PhotoRef { photo_id: photo.photo_id.clone() })
                    .collect();
                (!photos.is_empty()).then(|| PhotoOwner {
                    user_id: profile.user_id.clone(),
                    photos,
                })
            })
            .collect();

        (!owners.is_empty()).then(|| Self { resolution, profiles: owners })
    }

    pub fn photo_count(&self) -> usize {
        self.profiles.iter().map(|owner| owner.photos.len()).sum()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUrlsResponse {
    #[serde(default, alias = "urls")]
    pub url_by_user_id_photo_id_key: HashMap<String, String>,
}

// --- SIDE CHANNELS ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub user_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub access_token: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}
