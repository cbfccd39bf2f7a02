use tracing::debug;

use crate::gate::Decision;
use crate::model::{CountKey, FeedEnvelope, Profile, Section};

/// Projected output of one branch, handed over at the join point.
#[derive(Debug, Clone)]
pub struct BranchOutput {
    pub section: Section,
    pub profiles: Vec<Profile>,
    pub count: Option<(CountKey, i64)>,
}

impl BranchOutput {
    pub fn new(section: Section, profiles: Vec<Profile>) -> Self {
        Self {
            section,
            profiles,
            count: None,
        }
    }
}

/// Builds the envelope for one feed.
///
/// `layout` lists every section the feed exposes; each is present in the
/// output even when empty. `branches` must already be in the feed's fixed
/// output order, their profiles are concatenated per section in that order.
pub fn assemble(layout: &[Section], branches: Vec<BranchOutput>, decision: Decision) -> FeedEnvelope {
    let mut envelope = FeedEnvelope::default();
    for section in layout {
        envelope.sections.insert(*section, Vec::new());
    }

    match decision {
        Decision::Defer { after_secs } => {
            debug!("deferring whole response, repeat request after [{}]", after_secs);
            envelope.repeat_request_after = after_secs;
            for branch in &branches {
                if let Some((key, _)) = branch.count {
                    envelope.counts.insert(key, 0);
                }
            }
        }
        Decision::Proceed => {
            for branch in branches {
                if let Some((key, value)) = branch.count {
                    envelope.counts.insert(key, value);
                }
                envelope
                    .sections
                    .entry(branch.section)
                    .or_default()
                    .extend(branch.profiles);
            }
            for profiles in envelope.sections.values_mut() {
                stamp_positions(profiles);
            }
        }
    }

    envelope
}

/// 0-based position within the section, in concatenation order.
pub fn stamp_positions(profiles: &mut [Profile]) {
    for (index, profile) in profiles.iter_mut().enumerate() {
        profile.default_sorting_order_position = index;
    }
}
