use std::sync::Arc;

use tracing::{error, Instrument, Span};

use crate::assembler::{assemble, BranchOutput};
use crate::error::FeedError;
use crate::gate::{self, Decision};
use crate::model::{CountKey, FeedEnvelope, FeedKind, FeedRequest, Section, ShardKind};
use crate::projector::{self, PhotoUrls, Projection};
use crate::upstream::types::{PhotoBatch, ShardRequest};
use crate::FeedContext;

pub const UNKNOWN_PART: &str = "unknown part";
pub const HELLOS_PART: &str = "hellos";
pub const INBOX_PART: &str = "inbox";
pub const SENT_PART: &str = "sent";

/// Which slice of a shard a branch asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    New,
    Old,
    Whole,
}

impl Partition {
    fn request_new_part(&self) -> Option<bool> {
        match self {
            Partition::New => Some(true),
            Partition::Old => Some(false),
            Partition::Whole => None,
        }
    }

    fn default_unseen(&self) -> bool {
        matches!(self, Partition::New)
    }
}

/// One branch of a feed: which shard feeds which section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchSpec {
    pub section: Section,
    pub shard: ShardKind,
    pub partition: Partition,
    pub lmhis_part: Option<&'static str>,
    pub count_key: Option<CountKey>,
    pub require_photos: bool,
}

impl BranchSpec {
    pub fn new(section: Section, shard: ShardKind, partition: Partition) -> Self {
        Self {
            section,
            shard,
            partition,
            lmhis_part: None,
            count_key: None,
            require_photos: true,
        }
    }

    pub fn part(mut self, lmhis_part: &'static str) -> Self {
        self.lmhis_part = Some(lmhis_part);
        self
    }

    pub fn counted(mut self, key: CountKey) -> Self {
        self.count_key = Some(key);
        self
    }

    pub fn keep_photoless(mut self) -> Self {
        self.require_photos = false;
        self
    }
}

/// Branches of a feed in output order, plus every section it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPlan {
    pub kind: FeedKind,
    pub layout: Vec<Section>,
    pub branches: Vec<BranchSpec>,
}

impl FeedPlan {
    pub fn for_kind(kind: FeedKind) -> Self {
        use Partition::{New, Old, Whole};
        use Section::*;

        let branches = match kind {
            FeedKind::NewFaces => vec![BranchSpec::new(Profiles, ShardKind::NewFaces, Whole)],
            FeedKind::Discover => vec![BranchSpec::new(Profiles, ShardKind::Discover, Whole)],
            FeedKind::Lmm => vec![
                BranchSpec::new(LikesYou, ShardKind::LikesYou, New),
                BranchSpec::new(LikesYou, ShardKind::LikesYou, Old),
                BranchSpec::new(Matches, ShardKind::Matches, New),
                BranchSpec::new(Matches, ShardKind::Matches, Old),
                BranchSpec::new(Messages, ShardKind::Messages, Whole),
            ],
            FeedKind::Lmhis => vec![
                BranchSpec::new(LikesYou, ShardKind::LikesYou, New).part(UNKNOWN_PART),
                BranchSpec::new(LikesYou, ShardKind::LikesYou, Old).part(UNKNOWN_PART),
                BranchSpec::new(Matches, ShardKind::Matches, New).part(UNKNOWN_PART),
                BranchSpec::new(Matches, ShardKind::Matches, Old).part(UNKNOWN_PART),
                BranchSpec::new(Hellos, ShardKind::Lmhis, New).part(HELLOS_PART),
                BranchSpec::new(Hellos, ShardKind::Lmhis, Old).part(HELLOS_PART),
                BranchSpec::new(Inbox, ShardKind::Lmhis, Old).part(INBOX_PART),
                BranchSpec::new(Sent, ShardKind::Lmhis, Old).part(SENT_PART),
            ],
            FeedKind::Lc => vec![
                BranchSpec::new(LikesYou, ShardKind::LcLikes, Whole).counted(CountKey::AllLikesYouProfilesNum),
                BranchSpec::new(Messages, ShardKind::LcMessages, Whole).counted(CountKey::AllMessagesProfilesNum),
            ],
            FeedKind::Chat => vec![BranchSpec::new(Chat, ShardKind::Chat, Whole).keep_photoless()],
        };

        let mut layout: Vec<Section> = Vec::new();
        for branch in &branches {
            if !layout.contains(&branch.section) {
                layout.push(branch.section);
            }
        }

        Self { kind, layout, branches }
    }
}

/// What a branch reported besides its profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchStats {
    pub shard: ShardKind,
    pub section: Section,
    pub decision: Decision,
    pub raw_count: usize,
    pub chat_exists: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    pub envelope: FeedEnvelope,
    pub decision: Decision,
    pub stats: Vec<BranchStats>,
}

impl Aggregated {
    pub fn proceeded(&self) -> bool {
        !self.decision.is_defer()
    }

    /// Records the shards returned, before any projection filter.
    pub fn raw_count(&self) -> usize {
        self.stats.iter().map(|s| s.raw_count).sum()
    }

    pub fn chat_exists(&self) -> bool {
        self.stats.iter().any(|s| s.chat_exists == Some(true))
    }
}

struct BranchResult {
    stats: BranchStats,
    output: BranchOutput,
}

fn shard_request(ctx: &FeedContext, request: &FeedRequest, spec: &BranchSpec) -> ShardRequest {
    let mut shard_request = ShardRequest::new(&request.user_id, request.requested_watermark, request.resolution);
    shard_request.request_new_part = spec.partition.request_new_part();
    shard_request.lmhis_part = spec.lmhis_part.map(str::to_string);
    shard_request.limit = match request.kind {
        FeedKind::NewFaces | FeedKind::Discover => request.limit,
        FeedKind::Lc => Some(ctx.config.limits.lc_each_feed),
        _ => None,
    };
    if request.kind == FeedKind::Discover {
        shard_request.filter = request.filter.clone();
    }
    if request.kind == FeedKind::Chat {
        shard_request.opposite_user_id = request.opposite_user_id.clone();
    }
    shard_request
}

/// One shard call, gated and projected.
async fn run_branch(ctx: &FeedContext, request: &FeedRequest, spec: BranchSpec) -> Result<BranchResult, FeedError> {
    // 1. Fetch
    let client = ctx.shards.get(spec.shard)?;
    let result = client
        .fetch(&shard_request(ctx, request, &spec))
        .await
        .map_err(|e| FeedError::shard(spec.shard, e))?;

    // 2. Gate
    let decision = gate::decide_for(
        spec.shard,
        &request.user_id,
        request.requested_watermark,
        result.actual_watermark,
        ctx.config.repeat.backoff_for(request.kind),
    );

    let mut stats = BranchStats {
        shard: spec.shard,
        section: spec.section,
        decision,
        raw_count: result.profiles.len(),
        chat_exists: result.chat_exists,
    };
    let mut output = BranchOutput::new(spec.section, Vec::new());
    output.count = spec.count_key.map(|key| (key, result.total_count.unwrap_or(0)));

    if decision.is_defer() {
        stats.chat_exists = None;
        return Ok(BranchResult { stats, output });
    }

    // 3. Resolve photos the shard did not embed
    let urls = match PhotoBatch::unresolved(request.resolution, &result.profiles) {
        Some(batch) => ctx
            .photos
            .resolve(&batch)
            .await
            .map_err(FeedError::from)?,
        None => PhotoUrls::new(),
    };

    // 4. Project
    let projection = Projection {
        viewer_id: &request.user_id,
        resolution: request.resolution,
        urls: &urls,
        now_millis: projector::now_millis(),
        default_unseen: spec.partition.default_unseen(),
        require_photos: spec.require_photos,
    };
    output.profiles = result
        .profiles
        .into_iter()
        .filter_map(|raw| projection.project(raw))
        .collect();

    Ok(BranchResult { stats, output })
}

/// Fans the request out to every branch of `plan`, waits for all of them and
/// reduces the results into one envelope.
///
/// Any branch error fails the whole call. Any deferred branch defers the
/// whole envelope.
pub async fn aggregate(
    ctx: Arc<FeedContext>,
    request: Arc<FeedRequest>,
    plan: &FeedPlan,
) -> Result<Aggregated, FeedError> {
    // 1. One task per branch, each owning its result slot
    let handles: Vec<_> = plan
        .branches
        .iter()
        .map(|spec| {
            let ctx = ctx.clone();
            let request = request.clone();
            let spec = *spec;
            tokio::spawn(async move { run_branch(&ctx, &request, spec).await }.instrument(Span::current()))
        })
        .collect();

    // 2. Barrier. Siblings of a failed branch still run to completion.
    let mut slots = Vec::with_capacity(handles.len());
    let mut failure: Option<FeedError> = None;
    for (spec, handle) in plan.branches.iter().zip(handles) {
        match handle.await {
            Ok(Ok(result)) => slots.push(result),
            Ok(Err(err)) => {
                error!("({}) branch for section [{}] failed: {}", spec.shard, spec.section.as_str(), err);
                failure.get_or_insert(err);
            }
            Err(join_err) => {
                error!("({}) branch task aborted: {}", spec.shard, join_err);
                failure.get_or_insert(FeedError::Internal(join_err.to_string()));
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    // 3. Reduce and assemble in plan order
    let decision = Decision::reduce(slots.iter().map(|slot| slot.stats.decision));
    let (stats, outputs): (Vec<_>, Vec<_>) = slots.into_iter().map(|slot| (slot.stats, slot.output)).unzip();
    let envelope = assemble(&plan.layout, outputs, decision);

    Ok(Aggregated { envelope, decision, stats })
}
