use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BIGGEST_DEFAULT_RESOLUTION: Resolution = Resolution::R1440x1920;

/// Photo sizes the image pipeline renders.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    #[serde(rename = "480x640")]
    R480x640,
    #[serde(rename = "720x960")]
    R720x960,
    #[serde(rename = "1080x1440")]
    R1080x1440,
    #[serde(rename = "1440x1920")]
    R1440x1920,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::R480x640 => "480x640",
            Resolution::R720x960 => "720x960",
            Resolution::R1080x1440 => "1080x1440",
            Resolution::R1440x1920 => "1440x1920",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "480x640" => Ok(Resolution::R480x640),
            "720x960" => Ok(Resolution::R720x960),
            "1080x1440" => Ok(Resolution::R1080x1440),
            "1440x1920" => Ok(Resolution::R1440x1920),
            other => Err(format!("unsupported resolution '{}'", other)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing feeds served by the aggregation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    NewFaces,
    Discover,
    Lmm,
    Lmhis,
    Lc,
    Chat,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::NewFaces => "new_faces",
            FeedKind::Discover => "discover",
            FeedKind::Lmm => "lmm",
            FeedKind::Lmhis => "lmhis",
            FeedKind::Lc => "lc",
            FeedKind::Chat => "chat",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream data shards, one client per kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ShardKind {
    NewFaces,
    Discover,
    LikesYou,
    Matches,
    Messages,
    Lmhis,
    LcLikes,
    LcMessages,
    Chat,
}

impl ShardKind {
    pub const ALL: [ShardKind; 9] = [
        ShardKind::NewFaces,
        ShardKind::Discover,
        ShardKind::LikesYou,
        ShardKind::Matches,
        ShardKind::Messages,
        ShardKind::Lmhis,
        ShardKind::LcLikes,
        ShardKind::LcMessages,
        ShardKind::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardKind::NewFaces => "new-faces",
            ShardKind::Discover => "discover",
            ShardKind::LikesYou => "likes-you",
            ShardKind::Matches => "matches",
            ShardKind::Messages => "messages",
            ShardKind::Lmhis => "lmhis",
            ShardKind::LcLikes => "lc-likes",
            ShardKind::LcMessages => "lc-messages",
            ShardKind::Chat => "chat",
        }
    }
}

impl FromStr for ShardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShardKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown shard '{}'", s))
    }
}

impl fmt::Display for ShardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named lists of an envelope. Serialized as the JSON key of the section.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Profiles,
    LikesYou,
    Matches,
    Messages,
    Hellos,
    Inbox,
    Sent,
    Chat,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Profiles => "profiles",
            Section::LikesYou => "likesYou",
            Section::Matches => "matches",
            Section::Messages => "messages",
            Section::Hellos => "hellos",
            Section::Inbox => "inbox",
            Section::Sent => "sent",
            Section::Chat => "chat",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum CountKey {
    AllLikesYouProfilesNum,
    AllMessagesProfilesNum,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<i32>,
}

pub const MIN_AGE: i32 = 18;
pub const MIN_DISTANCE: i32 = 1000;

impl FeedFilter {
    /// Pulls the filter back inside the bounds the shards accept.
    pub fn normalized(self) -> Self {
        let min_age = self.min_age.unwrap_or(MIN_AGE).max(MIN_AGE);
        let max_age = self.max_age.map(|max| max.max(min_age));
        let max_distance = self.max_distance.map(|d| d.max(MIN_DISTANCE));
        Self {
            min_age: Some(min_age),
            max_age,
            max_distance,
        }
    }
}

/// One validated, authenticated feed request.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub request_id: Uuid,
    pub kind: FeedKind,
    pub user_id: String,
    pub requested_watermark: i64,
    pub resolution: Resolution,
    pub filter: Option<FeedFilter>,
    pub limit: Option<usize>,
    pub source: Option<String>,
    pub opposite_user_id: Option<String>,
    pub source_ip: Option<String>,
}

impl FeedRequest {
    pub fn new(kind: FeedKind, user_id: impl Into<String>, requested_watermark: i64, resolution: Resolution) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            user_id: user_id.into(),
            requested_watermark,
            resolution,
            filter: None,
            limit: None,
            source: None,
            opposite_user_id: None,
            source_ip: None,
        }
    }
}

// --- UPSTREAM RECORDS ---

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPhoto {
    #[serde(alias = "resizedPhotoId")]
    pub photo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_link: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub was_you_sender: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub msg_at: i64,
}

/// Display attributes copied verbatim from the shard record.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileAttributes {
    pub age: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    pub property: i32,
    pub transport: i32,
    pub income: i32,
    pub height: i32,
    pub education_level: i32,
    pub hair_color: i32,
    pub children: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tik_tok: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_live: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

/// Shard-native profile record.
///
/// `source*` fields describe the viewer (the requesting user), as the shards
/// stamp them on every record they return.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawProfile {
    pub user_id: String,
    #[serde(default)]
    pub photos: Vec<RawPhoto>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub unseen: Option<bool>,
    #[serde(default)]
    pub last_online_time: i64,
    #[serde(default)]
    pub source_locale: String,
    #[serde(default)]
    pub location_exist: bool,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub source_lat: f64,
    #[serde(default)]
    pub source_lon: f64,
    #[serde(flatten)]
    pub attributes: ProfileAttributes,
}

/// What one shard call produced. Immutable after return.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardResult {
    pub shard: ShardKind,
    pub profiles: Vec<RawProfile>,
    pub actual_watermark: i64,
    pub total_count: Option<i64>,
    pub chat_exists: Option<bool>,
}

impl ShardResult {
    pub fn new(shard: ShardKind, actual_watermark: i64, profiles: Vec<RawProfile>) -> Self {
        Self {
            shard,
            profiles,
            actual_watermark,
            total_count: None,
            chat_exists: None,
        }
    }
}

// --- CLIENT SHAPES ---

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub photo_id: String,
    pub photo_uri: String,
    pub thumbnail_photo_uri: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub photos: Vec<Photo>,
    pub unseen: bool,
    pub messages: Vec<Message>,
    pub last_online_text: String,
    pub last_online_flag: String,
    pub distance_text: String,
    #[serde(flatten)]
    pub attributes: ProfileAttributes,
    pub default_sorting_order_position: usize,
}

/// Response body for every list-shaped feed.
///
/// Sections are always present, empty when the response is deferred.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedEnvelope {
    #[serde(flatten)]
    pub sections: BTreeMap<Section, Vec<Profile>>,
    #[serde(flatten)]
    pub counts: BTreeMap<CountKey, i64>,
    pub repeat_request_after: i64,
}

impl FeedEnvelope {
    pub fn section(&self, section: Section) -> &[Profile] {
        self.sections.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn section_len(&self, section: Section) -> usize {
        self.section(section).len()
    }

    pub fn is_deferred(&self) -> bool {
        self.repeat_request_after > 0
    }
}

/// Response body of the single-conversation chat feed.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    pub chat: Profile,
    pub chat_exists: bool,
    pub repeat_request_after: i64,
    pub pull_again_after: i64,
}
