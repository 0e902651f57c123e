use std::collections::HashMap;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use regen_cache::cache::{
    InvalidationEvent, InvalidationResolver, METRIC_PURGE_KEYS_TOTAL, METRIC_RESOLVE_TOTAL,
    METRIC_UNKNOWN_EVENT_TOTAL,
};

#[test]
fn resolution_emits_expected_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let resolver = InvalidationResolver::new();
    let known = resolver.resolve(&InvalidationEvent::post_updated(1));
    let unknown = resolver.resolve(&InvalidationEvent::new("user_logged_in"));
    assert!(unknown.is_noop());

    let counters: HashMap<String, u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    assert_eq!(counters.get(METRIC_RESOLVE_TOTAL), Some(&2));
    assert_eq!(counters.get(METRIC_UNKNOWN_EVENT_TOTAL), Some(&1));
    assert_eq!(
        counters.get(METRIC_PURGE_KEYS_TOTAL),
        Some(&(known.purge_keys.len() as u64))
    );
}
