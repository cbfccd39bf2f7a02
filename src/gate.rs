use tracing::debug;

use crate::model::ShardKind;

/// Outcome of comparing the client's watermark with a shard's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Defer { after_secs: i64 },
}

impl Decision {
    pub fn is_defer(&self) -> bool {
        matches!(self, Decision::Defer { .. })
    }

    pub fn repeat_after(&self) -> i64 {
        match self {
            Decision::Proceed => 0,
            Decision::Defer { after_secs } => *after_secs,
        }
    }

    /// Union of two branch decisions: the response is only as fresh as its
    /// least fresh branch.
    pub fn union(self, other: Decision) -> Decision {
        match (self, other) {
            (Decision::Proceed, Decision::Proceed) => Decision::Proceed,
            (Decision::Defer { after_secs: a }, Decision::Defer { after_secs: b }) => {
                Decision::Defer { after_secs: a.max(b) }
            }
            (defer @ Decision::Defer { .. }, Decision::Proceed)
            | (Decision::Proceed, defer @ Decision::Defer { .. }) => defer,
        }
    }

    pub fn reduce<I: IntoIterator<Item = Decision>>(decisions: I) -> Decision {
        decisions.into_iter().fold(Decision::Proceed, Decision::union)
    }
}

/// Proceed when the shard has caught up with what the client already saw,
/// otherwise defer by the feed's backoff.
pub fn decide(requested: i64, actual: i64, backoff_secs: i64) -> Decision {
    if requested > actual {
        Decision::Defer { after_secs: backoff_secs }
    } else {
        Decision::Proceed
    }
}

pub fn decide_for(shard: ShardKind, user_id: &str, requested: i64, actual: i64, backoff_secs: i64) -> Decision {
    let decision = decide(requested, actual, backoff_secs);
    if decision.is_defer() {
        debug!(
            "({}) requested lastActionTime [{}] > actual lastActionTime [{}] for userId [{}], diff [{}]",
            shard,
            requested,
            actual,
            user_id,
            actual - requested
        );
    }
    decision
}
