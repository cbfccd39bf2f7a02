use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use clap::Parser;

use crate::model::{FeedKind, ShardKind};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(long, env = "FEEDGATE_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Base URL every shard and service URL is derived from.
    #[clap(long, env = "FEEDGATE_UPSTREAM", default_value = "http://127.0.0.1:9000")]
    pub upstream: String,

    /// Per-shard override, e.g. `--shard likes-you=http://likes:9000/feed`.
    #[clap(long = "shard", value_parser = parse_shard_override)]
    pub shards: Vec<(ShardKind, String)>,

    #[clap(long, env = "FEEDGATE_PHOTOS_URL")]
    pub photos: Option<String>,

    #[clap(long, env = "FEEDGATE_BACKFILL_URL")]
    pub backfill: Option<String>,

    #[clap(long, env = "FEEDGATE_EVENTS_URL")]
    pub events: Option<String>,

    #[clap(long, env = "FEEDGATE_AUTH_URL")]
    pub auth: Option<String>,

    #[clap(long, env = "FEEDGATE_UPSTREAM_TIMEOUT_MS", default_value = "3000")]
    pub upstream_timeout_ms: u64,

    #[clap(long, env = "FEEDGATE_NEW_FACES_REPEAT_AFTER", default_value = "2")]
    pub new_faces_repeat_after: i64,

    #[clap(long, env = "FEEDGATE_SOCIAL_REPEAT_AFTER", default_value = "800")]
    pub social_repeat_after: i64,

    #[clap(long, env = "FEEDGATE_CHAT_PULL_AGAIN_AFTER", default_value = "3000")]
    pub chat_pull_again_after: i64,

    /// 0 picks one worker per core.
    #[clap(long, env = "FEEDGATE_WORKER_THREADS", default_value = "0")]
    pub worker_threads: usize,
}

fn parse_shard_override(raw: &str) -> Result<(ShardKind, String), String> {
    let (name, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <shard>=<url>, got '{}'", raw))?;
    let kind = name.trim().parse::<ShardKind>()?;
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("empty url for shard '{}'", name));
    }
    Ok((kind, url.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub shards: BTreeMap<ShardKind, String>,
    pub photos: String,
    pub backfill: String,
    pub events: String,
    pub auth: String,
}

impl Endpoints {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let internal = |route: &str| format!("{}/internal/{}", base, route);
        Self {
            shards: ShardKind::ALL
                .iter()
                .map(|kind| (*kind, internal(kind.as_str())))
                .collect(),
            photos: internal("photos"),
            backfill: internal("prepare-new-faces"),
            events: internal("events"),
            auth: internal("auth"),
        }
    }
}

/// Backoff constants, in seconds, handed to clients as `repeatRequestAfter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub new_faces: i64,
    pub social: i64,
    pub chat_pull_again: i64,
}

impl RepeatPolicy {
    pub fn backoff_for(&self, kind: FeedKind) -> i64 {
        match kind {
            FeedKind::NewFaces | FeedKind::Discover => self.new_faces,
            FeedKind::Lmm | FeedKind::Lmhis | FeedKind::Lc | FeedKind::Chat => self.social,
        }
    }
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            new_faces: 2,
            social: 800,
            chat_pull_again: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub new_faces_default: usize,
    pub new_faces_max: usize,
    pub lc_each_feed: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            new_faces_default: 5,
            new_faces_max: 100,
            lc_each_feed: 150,
        }
    }
}

impl Limits {
    /// Absent or non-positive -> default, above the cap -> cap.
    pub fn clamp_new_faces(&self, limit: Option<i64>) -> usize {
        match limit {
            Some(n) if n > 0 => (n as usize).min(self.new_faces_max),
            _ => self.new_faces_default,
        }
    }
}

/// Immutable process-wide settings, built once at startup.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub addr: String,
    pub endpoints: Endpoints,
    pub upstream_timeout: Duration,
    pub repeat: RepeatPolicy,
    pub limits: Limits,
    pub worker_threads: usize,
}

impl FeedConfig {
    pub fn from_args(args: &Args) -> Self {
        let mut endpoints = Endpoints::from_base(&args.upstream);
        for (kind, url) in &args.shards {
            endpoints.shards.insert(*kind, url.clone());
        }
        if let Some(url) = &args.photos {
            endpoints.photos = url.clone();
        }
        if let Some(url) = &args.backfill {
            endpoints.backfill = url.clone();
        }
        if let Some(url) = &args.events {
            endpoints.events = url.clone();
        }
        if let Some(url) = &args.auth {
            endpoints.auth = url.clone();
        }

        let worker_threads = if args.worker_threads == 0 {
            detect_worker_threads()
        } else {
            args.worker_threads
        };

        Self {
            addr: args.addr.clone(),
            endpoints,
            upstream_timeout: Duration::from_millis(args.upstream_timeout_ms),
            repeat: RepeatPolicy {
                new_faces: args.new_faces_repeat_after,
                social: args.social_repeat_after,
                chat_pull_again: args.chat_pull_again_after,
            },
            limits: Limits::default(),
            worker_threads,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            endpoints: Endpoints::from_base("http://127.0.0.1:9000"),
            upstream_timeout: Duration::from_millis(3000),
            repeat: RepeatPolicy::default(),
            limits: Limits::default(),
            worker_threads: 2,
        }
    }
}

/// One worker per core, never fewer than 2.
pub fn detect_worker_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(2)
}
