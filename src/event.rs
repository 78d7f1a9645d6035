use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;

use crate::types::{Element, EventEnvelope, SubElement, SubEvent};

// <@U123> or <@U123|name>
static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").expect("Invalid mention regex"));

pub const EVENT_CALLBACK: &str = "event_callback";

#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    NotAnObject,
    InvalidChallenge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "Invalid JSON body: {}", e),
            DecodeError::NotAnObject => write!(f, "Request body is not a JSON object"),
            DecodeError::InvalidChallenge => write!(f, "challenge field is not a string"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

/// Parses a body that must be a top-level JSON object.
pub(crate) fn parse_object(raw_body: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice(raw_body).map_err(DecodeError::Json)? {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Decodes an Events API delivery. Either the whole envelope decodes or an error is returned.
pub fn decode_event(raw_body: &[u8]) -> Result<EventEnvelope, DecodeError> {
    // Going through a Map first keeps arrays from decoding as positional structs
    let object = parse_object(raw_body)?;
    serde_json::from_value(Value::Object(object)).map_err(DecodeError::Json)
}

/// One rich-text span, whether it sits directly in a block or one level down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub kind: &'a str,
    pub user_id: Option<&'a str>,
    pub text: Option<&'a str>,
}

impl<'a> From<&'a Element> for Span<'a> {
    fn from(element: &'a Element) -> Self {
        Self {
            kind: &element.element_type,
            user_id: element.user_id.as_deref(),
            text: element.text.as_deref(),
        }
    }
}

impl<'a> From<&'a SubElement> for Span<'a> {
    fn from(element: &'a SubElement) -> Self {
        Self {
            kind: &element.element_type,
            user_id: element.user_id.as_deref(),
            text: element.text.as_deref(),
        }
    }
}

impl EventEnvelope {
    pub fn is_event_callback(&self) -> bool {
        self.envelope_type == EVENT_CALLBACK
    }

    /// User id of the bot this delivery was authorized for, if any.
    pub fn bot_user_id(&self) -> Option<&str> {
        self.authorizations
            .iter()
            .find(|a| a.is_bot && !a.user_id.is_empty())
            .map(|a| a.user_id.as_str())
    }
}

impl SubEvent {
    pub fn is_threaded(&self) -> bool {
        self.thread_ts.as_deref().is_some_and(|ts| !ts.is_empty())
    }

    /// Thread to reply into: the existing thread, or a new one rooted at this message.
    pub fn reply_thread_ts(&self) -> Option<&str> {
        self.thread_ts
            .as_deref()
            .filter(|ts| !ts.is_empty())
            .or_else(|| Some(self.ts.as_str()).filter(|ts| !ts.is_empty()))
    }

    /// All rich-text spans in document order, each element followed by its children.
    pub fn spans(&self) -> impl Iterator<Item = Span<'_>> {
        self.blocks
            .iter()
            .flat_map(|block| block.elements.iter())
            .flat_map(|element| {
                std::iter::once(Span::from(element))
                    .chain(element.elements.iter().flatten().map(Span::from))
            })
    }

    /// Distinct user ids mentioned in the message, first occurrence first.
    ///
    /// Uses the rich-text blocks when they carry mentions, otherwise scans `text`.
    pub fn mentioned_users(&self) -> Vec<&str> {
        let mut users: Vec<&str> = Vec::new();

        for span in self.spans() {
            if span.kind == "user" {
                if let Some(id) = span.user_id {
                    if !users.contains(&id) {
                        users.push(id);
                    }
                }
            }
        }

        if users.is_empty() {
            for caps in MENTION_REGEX.captures_iter(&self.text) {
                if let Some(id) = caps.get(1).map(|m| m.as_str()) {
                    if !users.contains(&id) {
                        users.push(id);
                    }
                }
            }
        }

        users
    }

    pub fn mentions(&self, user_id: &str) -> bool {
        self.mentioned_users().contains(&user_id)
    }
}
