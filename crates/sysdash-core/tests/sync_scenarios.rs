use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::time::Duration as StdDuration;
use sysdash_core::wire::topics;
use sysdash_core::{
    Codec, DecodeError, Envelope, InboundMsg, ModuleStatus, Outcome, ResponseFormat,
    ResponseLogMode, StateStore, StoreConfig, DEFAULT_MAX_FRAME_BYTES,
};

fn ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms)
        .single()
        .expect("timestamp")
}

fn frame(topic: &str, payload: Value) -> String {
    let payload = match payload {
        Value::String(s) => s,
        other => other.to_string(),
    };
    serde_json::to_string(&Envelope::new(topic, payload)).expect("frame")
}

fn feed(store: &mut StateStore, codec: &Codec, raw: &str, now: DateTime<Utc>) -> Outcome {
    let msg = codec
        .decode_frame(raw, DEFAULT_MAX_FRAME_BYTES)
        .expect("decode");
    store.apply(msg, now)
}

#[test]
fn add_module_then_status_update() {
    let codec = Codec::default();
    let mut store = StateStore::default();
    let add = r#"{"topic":"addModule","payload":"{\"name\":\"worker-1\",\"status\":0,\"commands\":[\"ping\"],\"metrics\":{\"cpu\":12}}"}"#;
    let status = r#"{"topic":"statusUpdate","payload":"{\"name\":\"worker-1\",\"status\":2}"}"#;

    feed(&mut store, &codec, add, ts(0));
    feed(&mut store, &codec, status, ts(500));

    let snapshot = store.snapshot();
    let module = snapshot.module("worker-1").expect("worker-1");
    assert_eq!(module.status, ModuleStatus::Running);
    assert_eq!(module.commands, vec!["ping".to_string()]);
    let cpu = &module.metrics["cpu"];
    assert_eq!(cpu.len(), 1);
    assert_eq!(cpu[0].value, 12.0);
    assert_eq!(cpu[0].at, ts(0));
}

#[test]
fn heap_series_keeps_last_fifty() {
    let codec = Codec::default();
    let mut store = StateStore::new(
        StoreConfig {
            series_capacity: 50,
            ..StoreConfig::default()
        },
        "/",
    );
    for i in 1..=51 {
        let raw = frame(topics::HEAP_STATUS, Value::String(i.to_string()));
        feed(&mut store, &codec, &raw, ts(i));
    }
    let heap = store.snapshot().heap;
    assert_eq!(heap.len(), 50);
    assert_eq!(heap.first().map(|s| s.value), Some(2.0));
    assert_eq!(heap.last().map(|s| s.value), Some(51.0));
    assert!(heap.windows(2).all(|pair| pair[0].at <= pair[1].at));
}

#[test]
fn removed_module_ignores_later_updates() {
    let codec = Codec::default();
    let mut store = StateStore::default();
    feed(
        &mut store,
        &codec,
        &frame(topics::ADD_NODE, json!({"name": "n1", "status": true})),
        ts(0),
    );
    feed(&mut store, &codec, &frame(topics::REMOVE_NODE, json!("n1")), ts(1));
    let outcome = feed(
        &mut store,
        &codec,
        &frame(topics::NODE_STATUS, json!({"name": "n1", "status": 2})),
        ts(2),
    );
    assert_eq!(outcome, Outcome::Unchanged);
    assert!(store.module("n1").is_none());
    assert!(store.snapshot().modules.is_empty());
}

#[test]
fn ephemeral_response_expires_exactly_at_ttl() {
    let codec = Codec::default();
    let mut store = StateStore::new(
        StoreConfig {
            response_mode: ResponseLogMode::Ephemeral {
                ttl: StdDuration::from_secs(10),
                capacity: 10,
            },
            ..StoreConfig::default()
        },
        "/",
    );
    feed(
        &mut store,
        &codec,
        &frame(topics::RESPONSE_MESSAGE, json!("")),
        ts(0),
    );
    assert_eq!(store.next_response_deadline(), Some(ts(0) + Duration::seconds(10)));
    assert_eq!(store.responses().entries().next().map(|e| e.text.as_str()), Some("\u{00A0}"));

    assert_eq!(store.expire_responses(ts(9_999)), 0);
    assert_eq!(store.expire_responses(ts(10_000)), 1);
    assert!(store.responses().is_empty());
    assert_eq!(store.next_response_deadline(), None);
}

#[test]
fn ephemeral_log_expires_cached_entries_too() {
    let codec = Codec::default();
    let mut store = StateStore::default();
    feed(
        &mut store,
        &codec,
        &frame(topics::RESPONSE_MESSAGE, json!("live toast")),
        ts(0),
    );
    let cache = json!([{"id": "srv-1", "page": "/", "message": "from cache"}]);
    feed(
        &mut store,
        &codec,
        &frame(topics::GET_RESPONSE_MESSAGE_CACHE, cache),
        ts(2_000),
    );

    let texts: Vec<&str> = store.responses().entries().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["live toast", "from cache"]);
    assert!(store.responses().entries().all(|e| e.expires_at.is_some()));
    assert_eq!(store.expire_responses(ts(10_000)), 1);
    assert_eq!(store.next_response_deadline(), Some(ts(12_000)));
    assert_eq!(store.expire_responses(ts(365 * 24 * 3_600_000)), 1);
    assert!(store.responses().is_empty());
}

#[test]
fn persistent_cache_replaces_and_deletes() {
    let codec = Codec::new(ResponseFormat::Structured);
    let mut store = StateStore::new(
        StoreConfig {
            response_mode: ResponseLogMode::Persistent { capacity: 10 },
            ..StoreConfig::default()
        },
        "/",
    );
    feed(
        &mut store,
        &codec,
        &frame(topics::RESPONSE_MESSAGE, json!({"id": "old", "message": "stale"})),
        ts(0),
    );
    let cache = json!([
        {"id": "a", "page": "/", "timestamp": "2024-05-01T10:00:00Z", "message": "started worker-1"},
        {"id": "b", "page": "worker-1", "timestamp": 1_714_557_600_000i64, "message": "pong"}
    ]);
    feed(
        &mut store,
        &codec,
        &frame(topics::GET_RESPONSE_MESSAGE_CACHE, cache),
        ts(1),
    );
    let ids: Vec<String> = store.responses().entries().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

    let outcome = feed(
        &mut store,
        &codec,
        &frame(topics::DELETE_CACHED_RESPONSE_MESSAGE, json!("a")),
        ts(2),
    );
    assert_eq!(outcome, Outcome::Changed);
    assert_eq!(store.responses().len(), 1);
    assert_eq!(store.expire_responses(ts(3_600_000)), 0);
}

#[test]
fn page_merge_is_idempotent_except_sequences() {
    let codec = Codec::default();
    let mut store = StateStore::new(StoreConfig::default(), "worker-1");
    let data = json!({"name": "worker-1", "status": 1, "stats": {"up": 1}, "log": ["boot"]});
    feed(
        &mut store,
        &codec,
        &frame(
            topics::CHANGE_PAGE,
            json!({"type": 2, "data": data.to_string()}),
        ),
        ts(0),
    );

    let merge = frame(
        topics::UPDATE_PAGE_MERGE,
        json!({"name": "worker-1", "data": {"status": 2, "stats": {"up": 5}, "log": ["tick"]}}),
    );
    feed(&mut store, &codec, &merge, ts(1));
    let once = store.snapshot().page.data;
    feed(&mut store, &codec, &merge, ts(2));
    let twice = store.snapshot().page.data;

    assert_eq!(once["status"], twice["status"]);
    assert_eq!(once["stats"], twice["stats"]);
    assert_eq!(once["log"], json!(["boot", "tick"]));
    assert_eq!(twice["log"], json!(["boot", "tick", "tick"]));
}

#[test]
fn updates_for_other_pages_leave_state_untouched() {
    let codec = Codec::default();
    let mut store = StateStore::new(StoreConfig::default(), "/");
    feed(
        &mut store,
        &codec,
        &frame(
            topics::CHANGE_PAGE,
            json!({"type": 1, "data": json!({"name": "/", "clients": 3}).to_string()}),
        ),
        ts(0),
    );
    let before = store.snapshot();
    for topic in [topics::UPDATE_PAGE_REPLACE, topics::UPDATE_PAGE_MERGE] {
        let outcome = feed(
            &mut store,
            &codec,
            &frame(topic, json!({"name": "worker-9", "data": {"clients": 99}})),
            ts(1),
        );
        assert_eq!(outcome, Outcome::Unchanged);
    }
    assert_eq!(store.snapshot(), before);
}

#[test]
fn replace_overwrites_top_level_keys() {
    let codec = Codec::default();
    let mut store = StateStore::new(StoreConfig::default(), "/");
    feed(
        &mut store,
        &codec,
        &frame(
            topics::CHANGE_PAGE,
            json!({"type": 1, "data": json!({"name": "/", "stats": {"a": 1, "b": 2}}).to_string()}),
        ),
        ts(0),
    );
    feed(
        &mut store,
        &codec,
        &frame(
            topics::UPDATE_PAGE_REPLACE,
            json!({"name": "/", "data": {"stats": {"a": 9}}}),
        ),
        ts(1),
    );
    assert_eq!(store.snapshot().page.data["stats"], json!({"a": 9}));
}

#[test]
fn unknown_topics_never_reach_the_store() {
    let codec = Codec::default();
    let err = codec
        .decode_frame(&frame("nodeTeleport", json!("")), DEFAULT_MAX_FRAME_BYTES)
        .expect_err("unknown topic");
    assert!(matches!(err, DecodeError::UnknownTopic(_)));

    let err = codec
        .decode_frame(
            &frame(topics::STATUS_UPDATE, json!({"name": "a", "status": 7})),
            DEFAULT_MAX_FRAME_BYTES,
        )
        .expect_err("bad status");
    assert!(matches!(err, DecodeError::Payload { .. }));
}

#[test]
fn counters_and_process_series_feed_snapshot() {
    let codec = Codec::default();
    let mut store = StateStore::default();
    feed(
        &mut store,
        &codec,
        &frame(topics::ADD_MODULE, json!({"name": "broker", "status": 2})),
        ts(0),
    );
    feed(
        &mut store,
        &codec,
        &frame(
            "nodeSystemgeServerCounters",
            json!({"name": "broker", "bytesReceived": 128, "bytesSent": 64}),
        ),
        ts(1),
    );
    feed(
        &mut store,
        &codec,
        &frame(topics::GOROUTINE_COUNT, json!("17")),
        ts(1),
    );
    let snapshot = store.snapshot();
    let broker = snapshot.module("broker").expect("broker");
    assert_eq!(broker.metrics["systemgeServer/bytesReceived"][0].value, 128.0);
    assert_eq!(snapshot.goroutines.last().map(|s| s.value), Some(17.0));
    assert!(matches!(
        codec.decode_frame(&frame(topics::PASSWORD, json!("")), DEFAULT_MAX_FRAME_BYTES),
        Ok(InboundMsg::PasswordRequest)
    ));
}
