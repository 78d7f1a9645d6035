use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Slack sends `null` for some fields it would otherwise omit.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Rich-text spans carry a plain string; Block Kit elements carry a
/// `{"type": "plain_text", "text": ...}` object. Anything else is dropped.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Object(mut object) => match object.remove("text") {
            Some(Value::String(text)) => Some(text),
            _ => None,
        },
        _ => None,
    })
}

/// Outer `event_callback` payload of the Events API.
///
/// Every field tolerates being absent and unknown fields are skipped, so new
/// additions on Slack's side never break decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventEnvelope {
    #[serde(deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub team_id: String,
    #[serde(rename = "api_app_id", deserialize_with = "null_as_default")]
    pub app_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event: SubEvent,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub envelope_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_time: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub authorizations: Vec<Authorization>,
    #[serde(rename = "is_ext_shared_channel", deserialize_with = "null_as_default")]
    pub is_ext_shared: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub event_context: String,
}

/// The inner event, e.g. a `message` or an `app_mention`.
///
/// `ts`, `thread_ts` and `event_ts` are opaque sortable ids, not calendar times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub event_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub client_msg_id: String,
    pub thread_ts: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub team: String,
    #[serde(deserialize_with = "null_as_default")]
    pub channel: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Block {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub block_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub block_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub elements: Vec<Element>,
}

/// A rich-text span. Sections carry nested `elements`; mentions carry
/// `user_id`; text runs carry `text`. Block Kit elements such as buttons
/// decode too, with their label lifted into `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Element {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub element_type: String,
    pub elements: Option<Vec<SubElement>>,
    pub user_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub text: Option<String>,
}

/// Leaf span inside an [`Element`]. Does not nest further.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubElement {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub element_type: String,
    pub user_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Authorization {
    pub enterprise_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub team_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_bot: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_enterprise_install: bool,
}
