// tests/bridge_delivery.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use buildrelay::bridge::message::{
    BridgeMessage, COMPILE_ERROR, COMPILE_SUCCESS, SCRIPT_ADD, VIEW_LOCATIONS,
};
use buildrelay::bridge::{
    ChannelClient, ClientId, Dispatch, EnvelopeError, NotificationBridge,
};
use buildrelay::paths::PathNormalizer;
use buildrelay_test_utils::{init_tracing, FailingClient, RecordingClient};
use serde_json::{json, Map, Value};

type TestResult = Result<(), Box<dyn Error>>;

fn bridge() -> NotificationBridge {
    NotificationBridge::new(PathNormalizer::new("/proj"))
}

#[test]
fn broadcasts_wait_for_the_first_client_and_flush_in_order() {
    init_tracing();
    let mut bridge = bridge();

    assert_eq!(bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 1), Dispatch::Queued);
    assert_eq!(bridge.broadcast_at(COMPILE_SUCCESS, json!({"name": "a.js"}), 2), Dispatch::Queued);
    assert_eq!(bridge.broadcast_at(VIEW_LOCATIONS, json!({"views": {}}), 3), Dispatch::Queued);
    assert_eq!(bridge.pending_len(), 3);
    assert!(!bridge.has_connected());

    let client = RecordingClient::new(1);
    bridge.connect(Arc::new(client.clone()));

    // The status message was part of the flush, so it is not replayed twice.
    assert_eq!(client.kinds(), vec![SCRIPT_ADD, COMPILE_SUCCESS, VIEW_LOCATIONS]);
    assert!(bridge.has_connected());
    assert_eq!(bridge.pending_len(), 0);

    assert_eq!(
        bridge.broadcast_at(SCRIPT_ADD, json!({"name": "b.js"}), 4),
        Dispatch::Sent { delivered: 1, failed: 0 }
    );
    assert_eq!(client.frames().len(), 4);
}

#[test]
fn late_joiner_receives_only_the_last_status() {
    init_tracing();
    let mut bridge = bridge();

    let first = RecordingClient::new(1);
    bridge.connect(Arc::new(first.clone()));

    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 10);
    bridge.broadcast_at(COMPILE_SUCCESS, json!({"name": "a.js"}), 11);
    bridge.broadcast_at(
        COMPILE_ERROR,
        json!({"error": {"message": "boom", "file": "b.js", "timestamp": 12}}),
        12,
    );
    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "c.js"}), 13);

    let second = RecordingClient::new(2);
    bridge.connect(Arc::new(second.clone()));

    let replayed = second.messages();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["type"], COMPILE_ERROR);
    assert_eq!(replayed[0]["error"]["message"], "boom");

    assert_eq!(first.frames().len(), 4);
}

#[test]
fn older_status_does_not_replace_a_newer_one() {
    let mut bridge = bridge();

    bridge.broadcast_at(COMPILE_SUCCESS, json!({"name": "new.js"}), 200);
    bridge.broadcast_at(COMPILE_ERROR, json!({"error": {"message": "old"}}), 100);

    let status: Value =
        serde_json::from_str(bridge.last_status().expect("status remembered")).unwrap();
    assert_eq!(status["type"], COMPILE_SUCCESS);
    assert_eq!(status["name"], "new.js");
}

#[test]
fn equal_timestamps_favour_the_later_status() {
    let mut bridge = bridge();

    bridge.broadcast_at(COMPILE_SUCCESS, json!({"name": "a.js"}), 50);
    bridge.broadcast_at(COMPILE_ERROR, json!({"error": {"message": "tie"}}), 50);

    let status: Value = serde_json::from_str(bridge.last_status().unwrap()).unwrap();
    assert_eq!(status["type"], COMPILE_ERROR);
}

#[test]
fn non_status_messages_are_never_replayed() {
    let mut bridge = bridge();
    bridge.connect(Arc::new(RecordingClient::new(1)));

    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 1);
    assert!(bridge.last_status().is_none());

    let late = RecordingClient::new(2);
    bridge.connect(Arc::new(late.clone()));
    assert!(late.frames().is_empty());
}

#[test]
fn delivery_stays_live_after_every_client_leaves() {
    let mut bridge = bridge();

    bridge.connect(Arc::new(RecordingClient::new(1)));
    assert!(bridge.disconnect(ClientId(1)));
    assert!(!bridge.disconnect(ClientId(1)));
    assert_eq!(bridge.client_count(), 0);

    assert_eq!(
        bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 1),
        Dispatch::Sent { delivered: 0, failed: 0 }
    );
    assert_eq!(bridge.pending_len(), 0);
}

#[test]
fn a_failing_client_does_not_starve_the_others() {
    init_tracing();
    let mut bridge = bridge();

    let good = RecordingClient::new(2);
    bridge.connect(Arc::new(FailingClient::new(1)));
    bridge.connect(Arc::new(good.clone()));

    assert_eq!(
        bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 1),
        Dispatch::Sent { delivered: 1, failed: 1 }
    );
    assert_eq!(good.kinds(), vec![SCRIPT_ADD]);
}

#[test]
fn pending_queue_drops_the_oldest_when_full() {
    init_tracing();
    let mut bridge = bridge().with_pending_limit(2);

    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "1.js"}), 1);
    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "2.js"}), 2);
    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "3.js"}), 3);
    assert_eq!(bridge.pending_len(), 2);

    let client = RecordingClient::new(1);
    bridge.connect(Arc::new(client.clone()));

    let names: Vec<_> = client
        .messages()
        .iter()
        .map(|m| m["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["2.js", "3.js"]);
}

#[test]
fn dropped_status_is_still_replayed_on_first_connect() {
    let mut bridge = bridge().with_pending_limit(1);

    bridge.broadcast_at(COMPILE_SUCCESS, json!({"name": "a.js"}), 1);
    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "b.js"}), 2);

    let client = RecordingClient::new(1);
    bridge.connect(Arc::new(client.clone()));

    assert_eq!(client.kinds(), vec![SCRIPT_ADD, COMPILE_SUCCESS]);
}

#[test]
fn compile_error_file_is_shown_relative_to_the_project() {
    let mut bridge = bridge();
    let client = RecordingClient::new(1);
    bridge.connect(Arc::new(client.clone()));

    bridge.broadcast_at(
        COMPILE_ERROR,
        json!({"error": {"message": "x", "file": "/proj/src/app.js", "timestamp": 5}}),
        5,
    );
    bridge.broadcast_at(
        COMPILE_ERROR,
        json!({"error": {"message": "y", "file": "/elsewhere/lib.js", "timestamp": 6}}),
        6,
    );

    let messages = client.messages();
    assert_eq!(messages[0]["error"]["file"], "src/app.js");
    assert_eq!(messages[1]["error"]["file"], "/elsewhere/lib.js");
}

#[test]
fn frames_carry_type_and_timestamp_over_payload_fields() {
    let mut bridge = bridge();
    let client = RecordingClient::new(1);
    bridge.connect(Arc::new(client.clone()));

    bridge.broadcast_at(SCRIPT_ADD, json!({"type": "spoofed", "timestamp": 1, "name": "a"}), 77);
    bridge.broadcast_at(SCRIPT_ADD, json!("bare"), 78);
    bridge.broadcast_at(SCRIPT_ADD, Value::Null, 79);

    let messages = client.messages();
    assert_eq!(messages[0]["type"], SCRIPT_ADD);
    assert_eq!(messages[0]["timestamp"], 77);
    assert_eq!(messages[0]["name"], "a");
    assert_eq!(messages[1]["data"], "bare");
    assert_eq!(messages[2].as_object().map(|o| o.len()), Some(2));
}

#[test]
fn inbound_messages_reach_registered_handlers() {
    init_tracing();
    let mut bridge = bridge();

    let seen: Arc<Mutex<Vec<Map<String, Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = bridge.on(
        "client:log",
        Box::new(move |payload: &Map<String, Value>| sink.lock().unwrap().push(payload.clone())),
    );

    assert_eq!(
        bridge.handle_client_message(r#"{"type":"client:log","timestamp":1,"message":"hi"}"#),
        1
    );
    assert_eq!(
        bridge.handle_client_message(r#"{"_type":"client:log","message":"legacy"}"#),
        1
    );
    assert_eq!(bridge.handle_client_message(r#"{"type":"other"}"#), 0);

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["message"], "hi");
        assert!(seen[0].get("type").is_none());
        assert_eq!(seen[1]["message"], "legacy");
    }

    assert!(bridge.off(id));
    assert!(!bridge.off(id));
    assert_eq!(bridge.handle_client_message(r#"{"type":"client:log"}"#), 0);
}

#[test]
fn malformed_inbound_frames_are_dropped() {
    init_tracing();
    let mut bridge = bridge();
    bridge.on("client:log", Box::new(|_: &Map<String, Value>| {}));

    assert_eq!(bridge.handle_client_message("not json"), 0);
    assert_eq!(bridge.handle_client_message("[1, 2]"), 0);
    assert_eq!(bridge.handle_client_message(r#"{"message":"no type"}"#), 0);
    assert_eq!(bridge.handle_client_message(r#"{"type": 5}"#), 0);
}

#[test]
fn envelope_parse_errors_are_classified() {
    assert!(matches!(BridgeMessage::parse("{"), Err(EnvelopeError::Json(_))));
    assert!(matches!(BridgeMessage::parse("\"x\""), Err(EnvelopeError::NotAnObject)));
    assert!(matches!(BridgeMessage::parse("{}"), Err(EnvelopeError::MissingType)));
}

#[tokio::test]
async fn channel_client_forwards_frames_until_closed() -> TestResult {
    let (client, mut rx) = ChannelClient::new(ClientId(9));
    let mut bridge = bridge();
    bridge.connect(Arc::new(client));

    bridge.broadcast_at(SCRIPT_ADD, json!({"name": "a.js"}), 1);
    let frame = rx.recv().await.ok_or("channel closed early")?;
    let value: Value = serde_json::from_str(&frame)?;
    assert_eq!(value["name"], "a.js");

    drop(rx);
    assert_eq!(
        bridge.broadcast_at(SCRIPT_ADD, json!({"name": "b.js"}), 2),
        Dispatch::Sent { delivered: 0, failed: 1 }
    );
    Ok(())
}
