//! Audit-log decoration
//!
//! The hub's log query (q86/p86) returns terse numeric entries:
//! template ids, source/destination type codes, raw scene/room/group
//! ids and a unix timestamp. Entries are decorated into human-readable
//! records before delivery, resolving ids against the session's label
//! maps. A lookup miss produces a placeholder label, never a batch
//! failure.

use super::Gateway;
use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::warn;

const AUTOMATION_TRIGGER: i64 = 0x0000_0501;
const SCENE_RUN: i64 = 0x0000_0600;
const LIGHT_GROUP_OFF: i64 = 0x0001_01A0;
const LIGHT_GROUP_ON: i64 = 0x0001_01A1;
const LIGHT_GROUP_ADJUST_FIRST: i64 = 0x0001_01A2;
const LIGHT_GROUP_ADJUST_LAST: i64 = 0x0001_01AA;
const CURTAIN_GROUP_FIRST: i64 = 0x0001_03A0;
const CURTAIN_GROUP_LAST: i64 = 0x0001_03AB;

/// Source/record origin labels
fn source_label(code: i64) -> Option<&'static str> {
    Some(match code {
        1 => "cloud",
        2 => "mobile app",
        3 => "place control center",
        4 => "sub-device",
        100 => "HomeKit",
        101 => "HomeAssistant",
        102 => "Tmall Genie",
        103 => "Xiaodu speaker",
        _ => return None,
    })
}

/// Destination labels
fn destination_label(code: i64) -> Option<&'static str> {
    Some(match code {
        1 => "cloud",
        2 => "mobile app",
        3 => "place control center",
        4 => "sub-device",
        5 => "multiple devices",
        6 => "group device",
        _ => return None,
    })
}

/// Message template for a log entry id
fn log_template(id: i64) -> Option<&'static str> {
    Some(match id {
        0x0000_0001 => "Device booted for the {0}th time.",
        0x0000_0003 => "Device synchronized to UTC {0}s after boot.",
        0x0000_0500 => "Automation scheduled task ran, task: {0}; scene: {1}",
        0x0000_0501 => {
            "Automation device trigger, task: {0}; scene: {1}; device: {2}; attribute: {3}; value: {4}"
        }
        0x0000_0600 => "Executed scene {0}",
        0x0001_0100 => "Turned off light {0}",
        0x0001_0101 => "Turned on light {0}",
        0x0001_0102 => "Set light {0} brightness to {1}%",
        0x0001_0106 => "Set light {0} color temperature to {1}K",
        0x0001_010A => "Set light {0} RGB color to #{1}",
        0x0001_01A0 => "Turned off light group [room: {0}, subgroup: {1}]",
        0x0001_01A1 => "Turned on light group [room: {0}, subgroup: {1}]",
        0x0001_01A2 => "Set light group [room: {0}, subgroup: {1}] brightness to {2}%",
        0x0001_01A3 => "Brightened light group [room: {0}, subgroup: {1}]",
        0x0001_01A4 => "Dimmed light group [room: {0}, subgroup: {1}]",
        0x0001_01A5 => "Stepped light group [room: {0}, subgroup: {1}] brightness by {2}%",
        0x0001_01A6 => "Set light group [room: {0}, subgroup: {1}] color temperature to {2}K",
        0x0001_01A7 => "Raised light group [room: {0}, subgroup: {1}] color temperature",
        0x0001_01A8 => "Lowered light group [room: {0}, subgroup: {1}] color temperature",
        0x0001_01A9 => "Stepped light group [room: {0}, subgroup: {1}] color temperature by {2}K",
        0x0001_01AA => "Set light group [room: {0}, subgroup: {1}] RGB color to #{2}",
        0x0001_0200 => "Turned off relay {1} of switch {0}",
        0x0001_0201 => "Turned on relay {1} of switch {0}",
        0x0001_0300 => "Stopped curtain {0}",
        0x0001_0301 => "Opened curtain {0}",
        0x0001_0302 => "Closed curtain {0}",
        0x0001_0303 => "Set curtain {0} travel to {1}%",
        0x0001_03A0 => "Stopped curtain group [room: {0}, subgroup: {1}]",
        0x0001_03A1 => "Opened curtain group [room: {0}, subgroup: {1}]",
        0x0001_03A2 => "Closed curtain group [room: {0}, subgroup: {1}]",
        0x0001_03A3 => "Set curtain group [room: {0}, subgroup: {1}] travel to {2}%",
        0x0001_0B00 => "Turned off air conditioner {0}",
        0x0001_0B01 => "Turned on air conditioner {0}",
        0x0001_0B02 => "Set air conditioner {0} temperature to {1}\u{00B0}C",
        _ => return None,
    })
}

/// Fill `{0}`..`{4}` placeholders
fn render_template(template: &str, args: &[String]) -> String {
    let mut message = template.to_string();
    for (index, arg) in args.iter().enumerate() {
        message = message.replace(&format!("{{{index}}}"), arg);
    }
    message
}

fn relabel_origin(item: &mut Map<String, Value>, field: &str, renamed: &str, dest: bool) {
    let Some(origin) = item.remove(field) else { return };
    let mut origin = match origin {
        Value::Object(map) => map,
        other => {
            item.insert(renamed.to_string(), other);
            return;
        }
    };
    if let Some(code) = origin.get("t").and_then(Value::as_i64) {
        let label = if dest {
            destination_label(code)
        } else {
            source_label(code)
        };
        if let Some(label) = label {
            origin.insert("t".into(), Value::String(label.to_string()));
        }
    }
    item.insert(renamed.to_string(), Value::Object(origin));
}

impl Gateway {
    /// Decorate one audit-log response payload in place
    pub async fn decorate_audit_log(&self, mut payload: Value) -> Value {
        let Some(list) = payload.get_mut("list").and_then(Value::as_array_mut) else {
            warn!("audit-log payload without entry list passed through");
            return payload;
        };

        let session = self.session.lock().await;

        for entry in list {
            let Some(item) = entry.as_object_mut() else { continue };

            if let Some(timestamp) = item.get("t").and_then(Value::as_i64) {
                if let Some(time) = DateTime::from_timestamp(timestamp, 0) {
                    item.insert(
                        "time".into(),
                        Value::String(time.format("%Y-%m-%d %H:%M:%S").to_string()),
                    );
                }
            }

            relabel_origin(item, "s", "source", false);
            relabel_origin(item, "d", "destination", true);
            relabel_origin(item, "r", "record", false);

            let template_id = item.get("i").and_then(Value::as_i64).unwrap_or(-1);
            let mut args: Vec<String> = item
                .get("m")
                .and_then(Value::as_array)
                .map(|m| {
                    m.iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            let lookup = |name: Option<String>, raw: &String| match name {
                Some(name) => format!("{raw}-{name}"),
                None => {
                    warn!("audit-log label lookup miss for id {raw}");
                    format!("{raw}-unknown")
                }
            };
            let parse = |raw: &String| raw.parse::<i64>().ok();

            match template_id {
                AUTOMATION_TRIGGER if args.len() >= 2 => {
                    args[0] = lookup(
                        parse(&args[0]).and_then(|id| session.tasks.get(&id).cloned()),
                        &args[0].clone(),
                    );
                    args[1] = lookup(
                        parse(&args[1]).and_then(|id| session.scenes.get(&id).cloned()),
                        &args[1].clone(),
                    );
                }
                SCENE_RUN if !args.is_empty() => {
                    args[0] = lookup(
                        parse(&args[0]).and_then(|id| session.scenes.get(&id).cloned()),
                        &args[0].clone(),
                    );
                }
                LIGHT_GROUP_OFF | LIGHT_GROUP_ON if args.len() >= 2 => {
                    args[0] = lookup(
                        parse(&args[0]).map(|id| session.room_name(id)),
                        &args[0].clone(),
                    );
                    args[1] = lookup(
                        parse(&args[1]).map(|id| session.subgroup_name(id)),
                        &args[1].clone(),
                    );
                }
                id if (LIGHT_GROUP_ADJUST_FIRST..=LIGHT_GROUP_ADJUST_LAST).contains(&id)
                    && args.len() >= 2 =>
                {
                    args[0] = lookup(
                        parse(&args[0]).map(|id| session.room_name(id)),
                        &args[0].clone(),
                    );
                    args[1] = lookup(
                        parse(&args[1]).map(|id| session.subgroup_name(id)),
                        &args[1].clone(),
                    );
                }
                id if (CURTAIN_GROUP_FIRST..=CURTAIN_GROUP_LAST).contains(&id)
                    && !args.is_empty() =>
                {
                    args[0] = lookup(
                        parse(&args[0]).map(|id| session.room_name(id)),
                        &args[0].clone(),
                    );
                }
                _ => {}
            }

            match log_template(template_id) {
                Some(template) => {
                    item.insert(
                        "message".into(),
                        Value::String(render_template(template, &args)),
                    );
                }
                None => {
                    warn!("unknown audit-log template id {template_id}");
                }
            }

            for field in ["t", "m", "u", "p", "f", "i"] {
                item.remove(field);
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering() {
        let msg = render_template(
            log_template(LIGHT_GROUP_ON).unwrap(),
            &["3-Kitchen".to_string(), "0-All lights".to_string()],
        );
        assert_eq!(msg, "Turned on light group [room: 3-Kitchen, subgroup: 0-All lights]");
    }

    #[test]
    fn unknown_template_id() {
        assert!(log_template(0x7fff_ffff).is_none());
    }

    #[test]
    fn origin_labels() {
        assert_eq!(source_label(101), Some("HomeAssistant"));
        assert_eq!(destination_label(6), Some("group device"));
        assert_eq!(source_label(99), None);
    }
}
