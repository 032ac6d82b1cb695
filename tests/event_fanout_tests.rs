//! State-change decoding and fan-out tests

mod common;

use common::harness;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn relay_banks_fan_out_per_index() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "SW1", "relays": [1, 0, "1"]}]}),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(
        states,
        vec![
            ("switch:SW1:0".to_string(), json!({"on": true})),
            ("switch:SW1:1".to_string(), json!({"on": false})),
            ("switch:SW1:2".to_string(), json!({"on": true})),
        ]
    );
}

#[tokio::test]
async fn presence_sensor_exposes_lux_and_motion_views() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "S7", "devType": 7, "a15": 1}]}),
    )
    .await;

    let states = h.drain_state_changes();
    let keys: Vec<&str> = states.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["S7L", "S7M"]);
    assert_eq!(states[0].1["a15"], 1);
}

#[tokio::test]
async fn untyped_presence_marker_uses_the_same_views() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "PR1", "a15": 0}]}),
    )
    .await;

    let keys: Vec<String> = h.drain_state_changes().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["PR1L", "PR1M"]);
}

#[tokio::test]
async fn metering_device_exposes_four_views() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p5",
        json!({
            "seq": 3,
            "data": {"start": 0, "count": 1, "total": 1, "list": [
                {"sn": "M1", "devType": 20, "a41": 1},
            ]},
        }),
    )
    .await;

    let keys: Vec<String> = h.drain_state_changes().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["M1", "M1V", "M1C", "M1E"]);
}

#[tokio::test]
async fn input_panel_fans_out_per_channel() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p5",
        json!({
            "seq": 3,
            "data": {"start": 0, "count": 1, "total": 1, "list": [
                {"sn": "IP1", "devType": 16, "a100": 1},
            ]},
        }),
    )
    .await;

    let keys: Vec<String> = h.drain_state_changes().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["IP1_a100", "IP1_a101", "IP1_a102", "IP1_a103"]);
}

#[tokio::test]
async fn multi_zone_delta_is_not_temperature_corrected() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "MZ1", "a109": 1, "a19": 30}]}),
    )
    .await;

    let states = h.drain_state_changes();
    let keys: Vec<&str> = states.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["MZ1", "MZ1H", "MZ1F"]);
    assert_eq!(states[0].1["a19"], 30);
}

#[tokio::test]
async fn temp_panel_falls_back_to_fixed_offset() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p5",
        json!({
            "seq": 3,
            "data": {"start": 0, "count": 1, "total": 1, "list": [
                {"sn": "TP1", "devType": 9, "a19": 30},
            ]},
        }),
    )
    .await;

    let states = h.drain_state_changes();
    let keys: Vec<&str> = states.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["TP1", "TP1H", "TP1F"]);
    assert_eq!(states[0].1["a19"], 21);
}

#[tokio::test]
async fn temp_panel_uses_cached_reference_reading() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p5",
        json!({
            "seq": 3,
            "data": {"start": 0, "count": 1, "total": 1, "list": [
                {"sn": "A4C138A1E1BAE09E", "devType": 9, "a19": 25},
            ]},
        }),
    )
    .await;
    h.drain();

    h.deliver(
        "p/0/center/p5",
        json!({
            "seq": 3,
            "data": {"start": 0, "count": 1, "total": 1, "list": [
                {"sn": "TP1", "devType": 9, "a19": 31},
            ]},
        }),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(states[0].0, "TP1");
    assert_eq!(states[0].1["a19"], 25);
}

#[tokio::test]
async fn unrecognized_deltas_are_re_queried() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "X1", "battery": 50}]}),
    )
    .await;

    assert!(h.drain_state_changes().is_empty());
    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "P/0/center/q5");
    let body = published[0].json();
    assert_eq!(body["seq"], 3);
    assert_eq!(body["data"]["sns"], json!(["X1"]));
    assert_eq!(body["data"]["max"], 60);
}

#[tokio::test]
async fn lighting_delta_schedules_group_resync() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "L1", "on": 1, "level": 50}]}),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0, "L1");

    // The resync runs from a spawned task
    tokio::time::sleep(Duration::from_millis(50)).await;
    let resync: Vec<_> = h
        .transport
        .published()
        .into_iter()
        .filter(|m| m.topic == "P/0/center/q82")
        .collect();
    assert_eq!(resync.len(), 1);
    assert_eq!(resync[0].json()["seq"], 2);
}

#[tokio::test]
async fn housekeeping_counters_alone_do_not_resync() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "P1", "workingTime": 100}]}),
    )
    .await;

    assert!(h.drain_state_changes().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h
        .transport
        .published()
        .iter()
        .all(|m| m.topic != "P/0/center/q82"));
}

#[tokio::test]
async fn travel_delta_passes_through() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/3",
        json!({"seq": 3, "data": [{"sn": "CV1", "travel": 40}]}),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(states, vec![("CV1".to_string(), json!({"sn": "CV1", "travel": 40}))]);
}
