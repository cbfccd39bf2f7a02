use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::model::{Photo, Profile, RawPhoto, RawProfile, Resolution};

pub const EARTH_RADIUS_M: f64 = 6_372_800.0;

const ONLINE_WINDOW_MS: i64 = 900_000;
const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;
const TWO_DAYS_MS: i64 = 172_800_000;
const WEEK_MS: i64 = 604_800_000;
const FLAG_ONLINE_MS: i64 = 1_800_000;
const FLAG_AWAY_MS: i64 = 10_800_000;

pub const UNKNOWN: &str = "unknown";

/// Resolved photo URIs keyed by `"{userId}_{photoId}"`.
pub type PhotoUrls = HashMap<String, String>;

pub fn photo_key(user_id: &str, photo_id: &str) -> String {
    format!("{}_{}", user_id, photo_id)
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Display language for computed texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Default,
    Russian,
}

impl Lang {
    pub fn from_locale(locale: &str) -> Self {
        match locale.to_lowercase().as_str() {
            "ru" | "be" | "ua" => Lang::Russian,
            _ => Lang::Default,
        }
    }

    fn online(&self) -> &'static str {
        match self {
            Lang::Default => "Online",
            Lang::Russian => "Онлайн",
        }
    }

    fn minutes_ago(&self) -> &'static str {
        match self {
            Lang::Default => "m ago",
            Lang::Russian => "мин назад",
        }
    }

    fn hours_ago(&self) -> &'static str {
        match self {
            Lang::Default => "h ago",
            Lang::Russian => "ч назад",
        }
    }

    fn yesterday(&self) -> &'static str {
        match self {
            Lang::Default => "Yesterday",
            Lang::Russian => "Вчера",
        }
    }

    fn days_ago(&self) -> &'static str {
        match self {
            Lang::Default => "d ago",
            Lang::Russian => "д назад",
        }
    }

    fn km(&self) -> &'static str {
        match self {
            Lang::Default => "km",
            Lang::Russian => "км",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let hav = |theta: f64| 0.5 * (1.0 - theta.cos());
        let (phi1, phi2) = (self.lat.to_radians(), other.lat.to_radians());
        let dpsi = other.lon.to_radians() - self.lon.to_radians();
        let a = hav(phi2 - phi1) + phi1.cos() * phi2.cos() * hav(dpsi);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// The requesting user as the projector sees them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewer {
    pub lang: Lang,
    pub position: Option<GeoPoint>,
}

impl Viewer {
    /// Shards stamp the viewer's locale and position on every record.
    pub fn of(raw: &RawProfile) -> Self {
        Self {
            lang: Lang::from_locale(&raw.source_locale),
            position: raw
                .location_exist
                .then(|| GeoPoint::new(raw.source_lat, raw.source_lon)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineStatus {
    pub text: String,
    pub flag: String,
}

impl OnlineStatus {
    fn unknown() -> Self {
        Self {
            text: UNKNOWN.to_string(),
            flag: UNKNOWN.to_string(),
        }
    }
}

pub fn online_status(last_online_millis: i64, now_millis: i64, lang: Lang) -> OnlineStatus {
    if last_online_millis <= 0 {
        return OnlineStatus::unknown();
    }

    let diff = now_millis - last_online_millis;
    let text = if diff <= ONLINE_WINDOW_MS {
        lang.online().to_string()
    } else if diff < HOUR_MS {
        format!("{}{}", diff / MINUTE_MS, lang.minutes_ago())
    } else if diff <= DAY_MS {
        format!("{}{}", diff / HOUR_MS, lang.hours_ago())
    } else if diff <= TWO_DAYS_MS {
        lang.yesterday().to_string()
    } else if diff <= WEEK_MS {
        format!("{}{}", diff / DAY_MS, lang.days_ago())
    } else {
        return OnlineStatus::unknown();
    };

    let flag = if diff <= FLAG_ONLINE_MS {
        "online"
    } else if diff <= FLAG_AWAY_MS {
        "away"
    } else {
        "offline"
    };

    OnlineStatus {
        text,
        flag: flag.to_string(),
    }
}

pub fn distance_text(viewer: Option<GeoPoint>, target: Option<GeoPoint>, lang: Lang) -> String {
    let (Some(viewer), Some(target)) = (viewer, target) else {
        return UNKNOWN.to_string();
    };

    let meters = viewer.distance_to(&target);
    if meters <= 1000.0 {
        format!("1 {}", lang.km())
    } else if meters <= 100_000.0 {
        format!("{} {}", (meters / 1000.0).floor() as i64, lang.km())
    } else {
        format!("100+ {}", lang.km())
    }
}

/// Per-branch inputs shared by every record the projector sees.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    pub viewer_id: &'a str,
    pub resolution: Resolution,
    pub urls: &'a PhotoUrls,
    pub now_millis: i64,
    pub default_unseen: bool,
    pub require_photos: bool,
}

impl Projection<'_> {
    fn photo(&self, user_id: &str, raw: &RawPhoto) -> Option<Photo> {
        let uri = raw
            .link
            .clone()
            .or_else(|| self.urls.get(&photo_key(user_id, &raw.photo_id)).cloned())?;
        let thumbnail = raw.thumbnail_link.clone().unwrap_or_else(|| uri.clone());
        Some(Photo {
            photo_id: raw.photo_id.clone(),
            photo_uri: uri,
            thumbnail_photo_uri: thumbnail,
        })
    }

    /// Raw shard record to client profile. `None` means the profile has no
    /// displayable photo and must not be shown.
    pub fn project(&self, raw: RawProfile) -> Option<Profile> {
        let photos: Vec<Photo> = raw
            .photos
            .iter()
            .filter_map(|p| self.photo(&raw.user_id, p))
            .collect();

        if photos.is_empty() {
            warn!(
                "user [{}] returned with empty photo list for resolution [{}] for userId [{}]",
                raw.user_id, self.resolution, self.viewer_id
            );
            if self.require_photos {
                return None;
            }
        }

        let viewer = Viewer::of(&raw);
        let target = raw.location_exist.then(|| GeoPoint::new(raw.lat, raw.lon));
        let status = online_status(raw.last_online_time, self.now_millis, viewer.lang);
        let distance = distance_text(viewer.position, target, viewer.lang);
        debug!(
            "projected user [{}]: lastOnline [{}/{}], distance [{}]",
            raw.user_id, status.text, status.flag, distance
        );

        Some(Profile {
            user_id: raw.user_id,
            photos,
            unseen: raw.unseen.unwrap_or(self.default_unseen),
            messages: raw.messages,
            last_online_text: status.text,
            last_online_flag: status.flag,
            distance_text: distance,
            attributes: raw.attributes,
            default_sorting_order_position: 0,
        })
    }
}
