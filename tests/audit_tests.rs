//! Audit-log query and decoration tests

mod common;

use common::harness;
use general_link_gateway::GatewayNotification;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn audit_log_entries_are_decorated() {
    let mut h = harness().await;
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
    h.deliver(
        "p/0/center/p28",
        json!({"seq": 2, "data": [{"id": 9, "name": "Movie", "room": 2}]}),
    )
    .await;
    h.drain();

    h.gateway
        .query_audit_log(0, 0, 1_699_990_000, 1_700_000_000, 20, None)
        .await
        .unwrap();
    assert!(h
        .transport
        .subscriptions()
        .contains(&"p/0/center/p86".to_string()));
    let request = h.transport.take_published();
    assert_eq!(request.len(), 1);
    assert_eq!(request[0].topic, "P/0/center/q86");
    assert_eq!(request[0].json()["data"]["max"], 20);

    h.deliver(
        "p/0/center/p86",
        json!({
            "seq": 4,
            "data": {"list": [
                {"t": 1_700_000_000, "i": 0x0001_01A1, "m": ["2", "3"], "s": {"t": 101}},
                {"t": 1_700_000_000, "i": 0x0000_0600, "m": ["9"]},
                {"t": 1_700_000_000, "i": 0x0000_0600, "m": ["77"]},
            ]},
        }),
    )
    .await;

    let reports: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            GatewayNotification::ReportReceived { topic, payload } => Some((topic, payload)),
            _ => None,
        })
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "p/0/center/p86");

    let list = reports[0].1["list"].as_array().unwrap();
    assert_eq!(
        list[0]["message"],
        "Turned on light group [room: 2-Kitchen, subgroup: 3-Spots]"
    );
    assert_eq!(list[0]["source"]["t"], "HomeAssistant");
    assert_eq!(list[0]["time"], "2023-11-14 22:13:20");
    // Raw numeric fields are stripped after decoration
    assert!(list[0].get("i").is_none());
    assert!(list[0].get("m").is_none());
    assert!(list[0].get("t").is_none());

    assert_eq!(list[1]["message"], "Executed scene 9-Movie");
    // A label miss yields a placeholder, never a batch failure
    assert_eq!(list[2]["message"], "Executed scene 77-unknown");
}

#[tokio::test]
async fn unsolicited_unknown_topics_are_ignored() {
    let mut h = harness().await;
    h.deliver("p/0/center/p99", json!({"seq": 1, "data": {"x": 1}}))
        .await;
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn custom_subscription_happens_once() {
    let h = harness().await;
    h.gateway.subscribe_custom("p/0/center/p24").await.unwrap();
    h.gateway.subscribe_custom("p/0/center/p24").await.unwrap();
    assert_eq!(
        h.transport.subscriptions(),
        vec!["p/0/center/p24".to_string()]
    );
}
