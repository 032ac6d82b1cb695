//! Light-group aggregation tests

mod common;

use common::{harness, Harness};
use general_link_gateway::{EntityCategory, GatewayNotification};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn seed_rooms(h: &Harness) {
    h.deliver(
        "p/0/center/p33",
        json!({
            "seq": 2,
            "data": {
                "rooms": [{"id": 2, "name": "Kitchen", "icon": 1}],
                "lightsSubgroups": [{"id": 3, "name": "Spots"}],
            },
        }),
    )
    .await;
}

#[tokio::test]
async fn snapshot_registers_group_entities() {
    let mut h = harness().await;
    seed_rooms(&h).await;
    h.drain();

    h.deliver(
        "p/0/center/p82",
        json!({
            "seq": 1,
            "data": [{"a7": 1, "a8": 2, "a9": 3, "a10": 1, "a11": 80, "a12": 4000}],
        }),
    )
    .await;

    let groups: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            GatewayNotification::EntityDiscovered {
                category: EntityCategory::Light,
                device,
            } => Some(device),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["unique_id"], "2-3");
    assert_eq!(groups[0]["is_group"], true);
    assert_eq!(groups[0]["name"], "Kitchen-Spots");
    assert_eq!(groups[0]["room"], 2);
    assert_eq!(groups[0]["subgroup"], 3);
    assert_eq!(groups[0]["on"], 1);
}

#[tokio::test]
async fn resync_emits_aggregate_state() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p82",
        json!({
            "seq": 2,
            "data": [{"a7": 1, "a8": 2, "a9": 3, "a10": 1, "a11": 80, "a12": 4000}],
        }),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0, "2-3");
    assert_eq!(
        states[0].1,
        json!({"on": 1, "level": 80.0, "kelvin": 4000})
    );
}

#[tokio::test]
async fn group_events_forward_only_present_fields() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/5",
        json!({"seq": 5, "data": [{"a7": 1, "a8": 2, "a9": 3, "a10": 1}]}),
    )
    .await;

    let states = h.drain_state_changes();
    assert_eq!(states, vec![("2-3".to_string(), json!({"on": 1}))]);
}

#[tokio::test]
async fn zero_rgb_marker_is_dropped_from_events() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/5",
        json!({"seq": 5, "data": [{"a7": 1, "a8": 2, "a9": 3, "a10": 0, "a13": 0}]}),
    )
    .await;
    let states = h.drain_state_changes();
    assert_eq!(states, vec![("2-3".to_string(), json!({"on": 0}))]);

    h.deliver(
        "p/0/event/5",
        json!({"seq": 5, "data": [{"a7": 1, "a8": 2, "a9": 3, "a13": 255}]}),
    )
    .await;
    let states = h.drain_state_changes();
    assert_eq!(states, vec![("2-3".to_string(), json!({"rgb": 255}))]);
}

#[tokio::test]
async fn non_lighting_group_events_are_ignored() {
    let mut h = harness().await;
    h.deliver(
        "p/0/event/5",
        json!({"seq": 5, "data": [{"a7": 2, "a8": 2, "a9": 3, "a10": 1}]}),
    )
    .await;
    assert!(h.drain_state_changes().is_empty());
}

#[tokio::test]
async fn snapshot_rows_without_marker_are_skipped() {
    let mut h = harness().await;
    h.deliver(
        "p/0/center/p82",
        json!({"seq": 1, "data": [{"a8": 2, "a9": 3, "a10": 1}]}),
    )
    .await;
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn periodic_resync_requests_current_state() {
    let h = harness().await;
    h.gateway.sync_group_status(false).await.unwrap();

    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "P/0/center/q82");
    let body = published[0].json();
    assert_eq!(body["seq"], 2);
    assert_eq!(body["data"], json!([{"a7": 1}]));
}
