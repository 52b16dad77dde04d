use crate::template::PropertyValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event file dropped into `queue/incoming/` by the host runtime.
///
/// `event_id`, `handler` and `timestamp` are always present; the rest is
/// per-handler input, absent fields omitted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub event_id: String,
    pub handler: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl InboundEvent {
    /// Minimal event; tests and the host adapter fill in what they need.
    pub fn new(event_id: impl Into<String>, handler: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_id: event_id.into(),
            handler: handler.into(),
            timestamp,
            action_id: None,
            referral_message_id: None,
            annotation_type: None,
            annotation_payload: None,
            space_id: None,
            template_id: None,
            title: None,
            visibility: None,
            properties: Vec::new(),
            status: None,
            add_members: Vec::new(),
            remove_members: Vec::new(),
            people: Vec::new(),
            text: None,
            actor: None,
            color: None,
            query: None,
            operation_name: None,
            variables: None,
            payload: None,
        }
    }
}

/// One routed output written to `queue/outgoing/`. `slot`/`slots` carry the
/// sparse multi-output position; the host expands them into its own
/// positional convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub event_id: String,
    pub handler: String,
    pub slot: usize,
    pub slots: usize,
    pub timestamp: i64,
    pub payload: Value,
}

/// Terminal failure written to `queue/errors/`; no output accompanies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub event_id: String,
    pub handler: String,
    pub error: String,
    pub timestamp: i64,
}
