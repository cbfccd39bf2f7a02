use std::sync::Arc;

use feedgate::error::FeedError;
use feedgate::fanout::{self, FeedPlan};
use feedgate::model::{
    CountKey, FeedKind, FeedRequest, Resolution, Section, ShardKind,
};
use feedgate::projector::{photo_key, PhotoUrls};

mod support;

use support::{
    harness, harness_with_broken_photos, harness_with_broken_sinks, harness_with_urls, ids, linked, unlinked,
    ScriptedShard, VIEWER,
};

fn request(kind: FeedKind, watermark: i64) -> FeedRequest {
    FeedRequest::new(kind, VIEWER, watermark, Resolution::R720x960)
}

#[tokio::test]
async fn one_stale_shard_defers_the_whole_response() {
    let likes = Arc::new(
        ScriptedShard::new(ShardKind::LcLikes, 100, vec![linked("a"), linked("b"), linked("c")]).with_total(3),
    );
    let messages = Arc::new(ScriptedShard::new(ShardKind::LcMessages, 99, vec![linked("m")]).with_total(1));
    let mut h = harness(vec![likes, messages]);

    let envelope = h.service.feed(request(FeedKind::Lc, 100)).await.unwrap();

    assert!(envelope.is_deferred());
    assert_eq!(envelope.repeat_request_after, 800);
    assert_eq!(envelope.sections.len(), 2);
    assert!(envelope.section(Section::LikesYou).is_empty());
    assert!(envelope.section(Section::Messages).is_empty());
    assert_eq!(envelope.counts.get(&CountKey::AllLikesYouProfilesNum), Some(&0));
    assert_eq!(envelope.counts.get(&CountKey::AllMessagesProfilesNum), Some(&0));

    let event = h.next_event().await.expect("analytics event");
    assert_eq!(event.repeat_request_after, 800);
}

#[tokio::test]
async fn thin_new_faces_pool_triggers_backfill_once() {
    let shard = Arc::new(ScriptedShard::new(ShardKind::NewFaces, 120, vec![linked("first"), linked("second")]));
    let mut h = harness(vec![shard.clone()]);

    let mut req = request(FeedKind::NewFaces, 100);
    req.limit = Some(5);
    let envelope = h.service.feed(req).await.unwrap();

    assert!(!envelope.is_deferred());
    assert_eq!(ids(envelope.section(Section::Profiles)), [("first", 0), ("second", 1)]);
    assert_eq!(shard.calls()[0].limit, Some(5));

    assert_eq!(h.next_backfill().await.as_deref(), Some(VIEWER));
    assert_eq!(h.next_backfill().await, None);
}

#[tokio::test]
async fn full_or_deferred_new_faces_skip_backfill() {
    let full = Arc::new(ScriptedShard::new(ShardKind::NewFaces, 100, vec![linked("a"), linked("b")]));
    let mut h = harness(vec![full]);
    let mut req = request(FeedKind::NewFaces, 100);
    req.limit = Some(2);
    h.service.feed(req).await.unwrap();
    assert_eq!(h.next_backfill().await, None);

    let stale = Arc::new(ScriptedShard::new(ShardKind::NewFaces, 10, vec![linked("a")]));
    let mut h = harness(vec![stale]);
    let mut req = request(FeedKind::NewFaces, 100);
    req.limit = Some(5);
    let envelope = h.service.feed(req).await.unwrap();
    assert_eq!(envelope.repeat_request_after, 2);
    assert_eq!(h.next_backfill().await, None);
}

#[tokio::test]
async fn backfill_counts_raw_records_before_photo_filter() {
    // five records returned, only one displayable: the pool itself is not thin
    let shard = Arc::new(ScriptedShard::new(
        ShardKind::NewFaces,
        100,
        vec![linked("a"), unlinked("b", &["x"]), unlinked("c", &["x"]), unlinked("d", &["x"]), unlinked("e", &["x"])],
    ));
    let mut h = harness(vec![shard]);
    let mut req = request(FeedKind::NewFaces, 100);
    req.limit = Some(5);

    let envelope = h.service.feed(req).await.unwrap();
    assert_eq!(envelope.section_len(Section::Profiles), 1);
    assert_eq!(h.next_backfill().await, None);
}

#[tokio::test]
async fn failed_branch_aborts_and_siblings_still_finish() {
    let likes = Arc::new(ScriptedShard::new(ShardKind::LikesYou, 100, vec![linked("l")]).with_delay(50));
    let matches = Arc::new(ScriptedShard::failing(ShardKind::Matches));
    let messages = Arc::new(ScriptedShard::new(ShardKind::Messages, 100, vec![linked("m")]));
    let h = harness(vec![likes.clone(), matches, messages.clone()]);

    let err = h.service.feed(request(FeedKind::Lmm, 100)).await.unwrap_err();

    match err {
        FeedError::Upstream { shard, .. } => assert_eq!(shard, "matches"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(likes.calls().len(), 2);
    assert_eq!(messages.calls().len(), 1);
}

#[tokio::test]
async fn broken_backfill_and_events_never_reach_the_response() {
    let shard = Arc::new(ScriptedShard::new(ShardKind::NewFaces, 100, vec![linked("only")]));
    let mut h = harness_with_broken_sinks(vec![shard]);

    let mut req = request(FeedKind::NewFaces, 100);
    req.limit = Some(5);
    let envelope = h.service.feed(req).await.unwrap();

    assert!(!envelope.is_deferred());
    assert_eq!(ids(envelope.section(Section::Profiles)), [("only", 0)]);

    // both side effects were attempted and failed
    assert_eq!(h.next_backfill().await.as_deref(), Some(VIEWER));
    assert!(h.next_event().await.is_some());
}

#[tokio::test]
async fn photo_service_failure_names_the_photo_service() {
    let shard = Arc::new(ScriptedShard::new(ShardKind::Matches, 0, vec![unlinked("m", &["p1"])]));
    let likes = Arc::new(ScriptedShard::new(ShardKind::LikesYou, 0, vec![]));
    let messages = Arc::new(ScriptedShard::new(ShardKind::Messages, 0, vec![]));
    let h = harness_with_broken_photos(vec![likes, shard, messages]);

    let err = h.service.feed(request(FeedKind::Lmm, 0)).await.unwrap_err();

    match err {
        FeedError::Upstream { shard, .. } => assert_eq!(shard, "photos"),
        other => panic!("expected an upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn unregistered_shard_is_an_internal_error() {
    let h = harness(vec![]);
    let err = h.service.feed(request(FeedKind::Discover, 0)).await.unwrap_err();
    assert!(matches!(err, FeedError::Internal(_)));
}

#[tokio::test]
async fn photoless_profiles_are_dropped_and_positions_stay_dense() {
    let mut urls = PhotoUrls::new();
    urls.insert(photo_key("b", "b1"), "http://cdn/b1".into());
    let shard = Arc::new(ScriptedShard::new(
        ShardKind::Discover,
        100,
        vec![linked("a"), unlinked("ghost", &["g1"]), unlinked("b", &["b0", "b1"])],
    ));
    let h = harness_with_urls(vec![shard], urls);

    let envelope = h.service.feed(request(FeedKind::Discover, 100)).await.unwrap();
    let profiles = envelope.section(Section::Profiles);

    assert_eq!(ids(profiles), [("a", 0), ("b", 1)]);
    assert_eq!(profiles[1].photos.len(), 1);
    assert_eq!(profiles[1].photos[0].photo_uri, "http://cdn/b1");

    let batches = h.resolver.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].photo_count(), 3);
    assert_eq!(batches[0].resolution, Resolution::R720x960);
}

#[tokio::test]
async fn resolver_is_skipped_when_every_photo_is_linked() {
    let shard = Arc::new(ScriptedShard::new(ShardKind::NewFaces, 100, vec![linked("a")]));
    let h = harness(vec![shard]);
    h.service.feed(request(FeedKind::NewFaces, 0)).await.unwrap();
    assert!(h.resolver.batches().is_empty());
}

#[tokio::test]
async fn lmhis_sections_follow_plan_order_regardless_of_completion() {
    // the new partition answers last, it must still come first
    let likes = Arc::new(
        ScriptedShard::new(ShardKind::LikesYou, 100, vec![linked("like-new")])
            .with_old(vec![linked("like-old-1"), linked("like-old-2")])
            .with_delay(80),
    );
    let matches = Arc::new(ScriptedShard::new(ShardKind::Matches, 100, vec![linked("match-new")]));
    let lmhis = Arc::new(
        ScriptedShard::new(ShardKind::Lmhis, 100, vec![linked("hello-new")]).with_old(vec![linked("old-entry")]),
    );
    let h = harness(vec![likes.clone(), matches, lmhis.clone()]);

    let envelope = h.service.feed(request(FeedKind::Lmhis, 100)).await.unwrap();

    assert_eq!(
        ids(envelope.section(Section::LikesYou)),
        [("like-new", 0), ("like-old-1", 1), ("like-old-2", 2)]
    );
    assert_eq!(ids(envelope.section(Section::Matches)), [("match-new", 0)]);
    assert_eq!(ids(envelope.section(Section::Hellos)), [("hello-new", 0), ("old-entry", 1)]);
    assert_eq!(ids(envelope.section(Section::Inbox)), [("old-entry", 0)]);
    assert_eq!(ids(envelope.section(Section::Sent)), [("old-entry", 0)]);

    let likes_section = envelope.section(Section::LikesYou);
    assert!(likes_section[0].unseen);
    assert!(!likes_section[1].unseen);

    let mut parts: Vec<_> = lmhis
        .calls()
        .into_iter()
        .map(|call| (call.lmhis_part.unwrap_or_default(), call.request_new_part))
        .collect();
    parts.sort();
    assert_eq!(
        parts,
        [
            ("hellos".to_string(), Some(false)),
            ("hellos".to_string(), Some(true)),
            ("inbox".to_string(), Some(false)),
            ("sent".to_string(), Some(false)),
        ]
    );
    assert!(likes.calls().iter().all(|c| c.lmhis_part.as_deref() == Some("unknown part")));
}

#[tokio::test]
async fn identical_inputs_give_identical_envelopes() {
    let build = || {
        vec![
            Arc::new(ScriptedShard::new(ShardKind::LikesYou, 5, vec![linked("a")]).with_old(vec![linked("b")])),
            Arc::new(ScriptedShard::new(ShardKind::Matches, 5, vec![])),
            Arc::new(ScriptedShard::new(ShardKind::Messages, 5, vec![linked("m")])),
        ]
    };
    let first = harness(build()).service.feed(request(FeedKind::Lmm, 5)).await.unwrap();
    let second = harness(build()).service.feed(request(FeedKind::Lmm, 5)).await.unwrap();

    assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::to_value(&second).unwrap());
}

#[tokio::test]
async fn lc_counts_pass_through_on_proceed() {
    let likes = Arc::new(ScriptedShard::new(ShardKind::LcLikes, 50, vec![linked("a")]).with_total(42));
    let messages = Arc::new(ScriptedShard::new(ShardKind::LcMessages, 50, vec![]).with_total(7));
    let h = harness(vec![likes.clone(), messages]);

    let envelope = h.service.feed(request(FeedKind::Lc, 50)).await.unwrap();

    assert_eq!(envelope.counts.get(&CountKey::AllLikesYouProfilesNum), Some(&42));
    assert_eq!(envelope.counts.get(&CountKey::AllMessagesProfilesNum), Some(&7));
    assert_eq!(likes.calls()[0].limit, Some(150));
}

#[tokio::test]
async fn chat_keeps_photoless_peer() {
    let chat = Arc::new(ScriptedShard::new(ShardKind::Chat, 100, vec![unlinked("peer", &[])]).with_chat_exists(true));
    let mut h = harness(vec![chat.clone()]);

    let mut req = request(FeedKind::Chat, 100);
    req.opposite_user_id = Some("peer".into());
    let envelope = h.service.chat(req).await.unwrap();

    assert_eq!(envelope.chat.user_id, "peer");
    assert!(envelope.chat_exists);
    assert_eq!(envelope.repeat_request_after, 0);
    assert_eq!(envelope.pull_again_after, 3000);
    assert_eq!(chat.calls()[0].opposite_user_id.as_deref(), Some("peer"));

    let event = h.next_event().await.expect("chat event");
    assert_eq!(event.event_type, "FEEDS_CHAT_RETURNED");
}

#[tokio::test]
async fn stale_chat_returns_empty_peer() {
    let chat = Arc::new(ScriptedShard::new(ShardKind::Chat, 1, vec![linked("peer")]).with_chat_exists(true));
    let h = harness(vec![chat]);

    let envelope = h.service.chat(request(FeedKind::Chat, 100)).await.unwrap();

    assert!(envelope.chat.user_id.is_empty());
    assert!(!envelope.chat_exists);
    assert_eq!(envelope.repeat_request_after, 800);
    assert_eq!(envelope.pull_again_after, 3000);
}

#[tokio::test]
async fn aggregate_reports_per_branch_stats() {
    let shard = Arc::new(ScriptedShard::new(ShardKind::Messages, 9, vec![linked("a"), unlinked("b", &[])]));
    let likes = Arc::new(ScriptedShard::new(ShardKind::LikesYou, 9, vec![]));
    let matches = Arc::new(ScriptedShard::new(ShardKind::Matches, 9, vec![]));
    let h = harness(vec![shard, likes, matches]);

    let plan = FeedPlan::for_kind(FeedKind::Lmm);
    let aggregated = fanout::aggregate(h.ctx(), Arc::new(request(FeedKind::Lmm, 9)), &plan)
        .await
        .unwrap();

    assert!(aggregated.proceeded());
    assert_eq!(aggregated.stats.len(), 5);
    assert_eq!(aggregated.raw_count(), 2);
    assert_eq!(aggregated.envelope.section_len(Section::Messages), 1);
}
