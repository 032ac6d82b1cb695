//! Wire protocol: envelopes, topics and the inbound router
//!
//! Every exchange with the place controller rides the same envelope.
//! Requests carry `{seq, rspTo, data}` where `rspTo` names the topic
//! prefix the hub should answer on; responses echo the `seq` tag, which
//! is the only request/response correlation the protocol offers.
//! Inbound topics are classified by their trailing path segments into a
//! closed [`TopicKind`]; suffixes this build does not know are ignored
//! so newer hub firmware does not break the bridge.

pub mod event;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic prefix the hub publishes responses and events under
pub const RESPONSE_PREFIX: &str = "p";

/// Topic prefix for requests to the place controller
pub const REQUEST_PREFIX: &str = "P";

/// Request envelope wrapping every outbound payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Stage/page discriminator echoed by the hub
    pub seq: i64,
    /// Topic prefix the hub should respond on
    #[serde(rename = "rspTo")]
    pub rsp_to: String,
    /// Operation payload
    pub data: Value,
}

/// Response envelope for all inbound hub messages
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Echoed stage/page discriminator
    #[serde(default)]
    pub seq: i64,
    /// Response payload
    pub data: Value,
}

/// One page of a paginated response
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub start: i64,
    pub count: i64,
    pub total: i64,
    #[serde(default)]
    pub list: Vec<Value>,
}

impl Page {
    /// Whether a follow-up request is needed to fetch the remainder
    pub fn has_more(&self) -> bool {
        self.start + self.count < self.total
    }

    /// Start offset for the follow-up request
    pub fn next_start(&self) -> i64 {
        self.start + self.count
    }
}

/// Inbound topic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Device-list page (`…/p5`)
    DeviceList,
    /// Scene list (`…/p28`)
    SceneList,
    /// Basic data: rooms and subgroups (`…/p33`)
    BasicData,
    /// Automation task list (`…/p71`)
    AutomationTaskList,
    /// Media-player metadata response (`…/p55`)
    MediaMetadata,
    /// Group snapshot page (`…/p82`)
    GroupPage,
    /// Per-device state-change stream (`…/event/3`)
    DeviceEvent,
    /// Reserved log event stream (`…/event/4`)
    LogEvent,
    /// Group state-change stream (`…/event/5`)
    GroupEvent,
    /// Free-form hub reports (`…/report/q5`, `…/report/q7`)
    Report,
    /// Anything this build does not recognize
    Unknown,
}

impl TopicKind {
    /// Classify a topic by its trailing path segments
    pub fn classify(topic: &str) -> TopicKind {
        let mut segments = topic.rsplit('/');
        let last = segments.next().unwrap_or("");
        let parent = segments.next().unwrap_or("");

        match (parent, last) {
            ("event", "3") => TopicKind::DeviceEvent,
            ("event", "4") => TopicKind::LogEvent,
            ("event", "5") => TopicKind::GroupEvent,
            ("report", "q5") | ("report", "q7") => TopicKind::Report,
            ("center", "p5") => TopicKind::DeviceList,
            ("center", "p28") => TopicKind::SceneList,
            ("center", "p33") => TopicKind::BasicData,
            ("center", "p71") => TopicKind::AutomationTaskList,
            ("center", "p55") => TopicKind::MediaMetadata,
            ("center", "p82") => TopicKind::GroupPage,
            _ => TopicKind::Unknown,
        }
    }
}

/// Build a request topic `P/<addr>/center/<op>`
pub fn request_topic(addr: i64, op: &str) -> String {
    format!("{REQUEST_PREFIX}/{addr}/center/{op}")
}

/// Build the response topic prefix for `rspTo`
pub fn response_prefix(addr: i64) -> String {
    format!("{RESPONSE_PREFIX}/{addr}")
}

/// Response topic `p/<addr>/center/<op>` matching a request operation
pub fn response_topic(addr: i64, op: &str) -> String {
    format!("{RESPONSE_PREFIX}/{addr}/center/{op}")
}

/// Derive the response topic a custom request will be answered on,
/// e.g. `P/3/center/q86` → `p/3/center/p86`
pub fn response_topic_for_request(addr: i64, request_topic: &str) -> String {
    let tail: Vec<&str> = request_topic.rsplit('/').take(2).collect();
    let op = tail
        .first()
        .map(|s| s.replacen('q', "p", 1))
        .unwrap_or_default();
    let scope = tail.get(1).copied().unwrap_or("center");
    format!("{RESPONSE_PREFIX}/{addr}/{scope}/{op}")
}
