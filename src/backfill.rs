use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::upstream::BackfillSink;

/// The shard's pool is thinner than what the client asked for.
pub fn should_backfill(returned_count: usize, requested_limit: usize, proceeded: bool) -> bool {
    proceeded && returned_count < requested_limit
}

/// Asks the shard to prepare more profiles for `user_id` without blocking
/// the caller. Failures are logged and dropped.
///
/// Returns the handle of the spawned signal, `None` when nothing fired.
pub fn maybe_trigger_backfill(
    sink: Arc<dyn BackfillSink>,
    user_id: &str,
    returned_count: usize,
    requested_limit: usize,
    proceeded: bool,
) -> Option<JoinHandle<()>> {
    if !should_backfill(returned_count, requested_limit, proceeded) {
        return None;
    }

    debug!(
        "returned [{}] < limit [{}], requesting backfill for userId [{}]",
        returned_count, requested_limit, user_id
    );
    let user_id = user_id.to_string();
    Some(tokio::spawn(async move {
        if let Err(e) = sink.prepare(&user_id).await {
            warn!("backfill for userId [{}] failed: {}", user_id, e);
        }
    }))
}
