//! Per-handler workflows dispatched by the queue worker. Each handler takes
//! its config table entry plus the inbound event, talks to the platform
//! through the shared context and returns routed outputs.

use crate::auth::AccessToken;
use crate::config::HandlerConfig;
use crate::graphql::{GraphqlClient, GraphqlError};
use crate::queue::InboundEvent;
use crate::template::{StatusError, TranslationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub mod action_filter;
pub mod annotation_filter;
pub mod graphql_query;
pub mod messages;
pub mod people;
pub mod spaces;

pub use action_filter::{parse_rules, ActionRule};
pub use annotation_filter::{parse_targets, OutputTarget, NLP_AGGREGATE_LABEL};

pub const FOCUS_ANNOTATION_TYPE: &str = "message-focus";

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler `{handler_id}` requires field `{field}` on its config or event")]
    MissingField { handler_id: String, field: String },
    #[error("no access token available")]
    TokenUnavailable,
    #[error("invalid action pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("no `{FOCUS_ANNOTATION_TYPE}` annotation with lens `{lens}` on message `{message_id}`")]
    LensNotFound { lens: String, message_id: String },
    #[error(transparent)]
    Graphql(#[from] GraphqlError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Everything a handler invocation may touch. Built fresh per claimed event;
/// handlers share nothing across invocations.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub client: GraphqlClient,
    pub token: AccessToken,
    pub state_root: PathBuf,
}

impl HandlerContext {
    pub fn new(client: GraphqlClient, token: AccessToken, state_root: PathBuf) -> Self {
        Self {
            client,
            token,
            state_root,
        }
    }
}

/// One output positioned in a sparse multi-output result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedOutput {
    pub slot: usize,
    pub payload: Value,
}

/// Handler result: total arity plus the (possibly empty) outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub slots: usize,
    pub outputs: Vec<RoutedOutput>,
}

impl HandlerOutcome {
    pub fn single(payload: Value) -> Self {
        Self::routed(0, 1, payload)
    }

    pub fn routed(slot: usize, slots: usize, payload: Value) -> Self {
        Self {
            slots,
            outputs: vec![RoutedOutput { slot, payload }],
        }
    }

    /// A matched-nothing result: the arity is known, nothing is emitted.
    pub fn silent(slots: usize) -> Self {
        Self {
            slots,
            outputs: Vec::new(),
        }
    }
}

pub fn dispatch(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &HandlerConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    match config {
        HandlerConfig::ActionFilter(cfg) => action_filter::run(ctx, handler_id, cfg, event),
        HandlerConfig::AnnotationFilter(cfg) => annotation_filter::run(ctx, handler_id, cfg, event),
        HandlerConfig::SpaceCreate(cfg) => spaces::run_create(ctx, handler_id, cfg, event),
        HandlerConfig::SpaceUpdate(cfg) => spaces::run_update(ctx, handler_id, cfg, event),
        HandlerConfig::PersonLookup(cfg) => people::run(ctx, handler_id, cfg, event),
        HandlerConfig::MessagePost(cfg) => messages::run(ctx, handler_id, cfg, event),
        HandlerConfig::Graphql(cfg) => graphql_query::run(ctx, handler_id, cfg, event),
    }
}

/// Decoded annotation. Messages carry annotations as JSON-encoded strings;
/// `payload` and `context` may be JSON-encoded strings themselves.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Decodes one annotation string; undecodable annotations are skipped by
/// callers rather than failing the invocation.
pub fn decode_annotation(raw: &str) -> Option<Annotation> {
    serde_json::from_str(raw).ok()
}

/// Decodes string-valued `payload`/`context` in place; a string that is not
/// valid JSON stays as it arrived.
pub fn decode_nested_fields(annotation: &mut Annotation) {
    for field in [&mut annotation.payload, &mut annotation.context] {
        if let Some(Value::String(raw)) = field {
            if let Ok(decoded) = serde_json::from_str::<Value>(raw) {
                *field = Some(decoded);
            }
        }
    }
}

/// The event payload forwarded by pass-through paths.
pub(crate) fn passthrough_payload(event: &InboundEvent) -> Value {
    event.payload.clone().unwrap_or(Value::Null)
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Config wins when it carries a non-empty value; used for deployment-owned
/// fields (ids, endpoints, identities).
pub(crate) fn config_first(config: Option<&str>, event: Option<&str>) -> Option<String> {
    non_empty(config).or_else(|| non_empty(event))
}

/// Event wins; used for per-invocation data (titles, texts, queries).
pub(crate) fn event_first(event: Option<&str>, config: Option<&str>) -> Option<String> {
    non_empty(event).or_else(|| non_empty(config))
}

pub(crate) fn missing_field(handler_id: &str, field: &str) -> HandlerError {
    HandlerError::MissingField {
        handler_id: handler_id.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotation_decodes_from_encoded_string() {
        let raw = r#"{"type":"message-focus","lens":"confirm","payload":"{\"x\":1}","extra":true}"#;
        let annotation = decode_annotation(raw).expect("decode");
        assert_eq!(annotation.kind.as_deref(), Some("message-focus"));
        assert_eq!(annotation.lens.as_deref(), Some("confirm"));
        assert_eq!(annotation.rest["extra"], json!(true));
    }

    #[test]
    fn nested_fields_decode_opportunistically() {
        let mut annotation =
            decode_annotation(r#"{"type":"t","payload":"{\"x\":1}","context":"not json"}"#)
                .expect("decode");
        decode_nested_fields(&mut annotation);
        assert_eq!(annotation.payload, Some(json!({"x": 1})));
        assert_eq!(annotation.context, Some(json!("not json")));
    }

    #[test]
    fn undecodable_annotation_is_none() {
        assert!(decode_annotation("{{nope").is_none());
    }

    #[test]
    fn annotation_round_trips_unknown_fields() {
        let raw = r#"{"type":"t","score":0.9}"#;
        let annotation = decode_annotation(raw).expect("decode");
        let wire = serde_json::to_value(&annotation).expect("encode");
        assert_eq!(wire["type"], json!("t"));
        assert_eq!(wire["score"], json!(0.9));
    }

    #[test]
    fn precedence_helpers_trim_and_prefer() {
        assert_eq!(
            config_first(Some("cfg"), Some("evt")).as_deref(),
            Some("cfg")
        );
        assert_eq!(config_first(Some("  "), Some("evt")).as_deref(), Some("evt"));
        assert_eq!(event_first(Some("evt"), Some("cfg")).as_deref(), Some("evt"));
        assert_eq!(event_first(None, Some(" cfg ")).as_deref(), Some("cfg"));
        assert_eq!(event_first(None, None), None);
    }

    #[test]
    fn outcome_constructors_fix_arity() {
        let single = HandlerOutcome::single(json!(1));
        assert_eq!(single.slots, 1);
        assert_eq!(single.outputs[0].slot, 0);

        let silent = HandlerOutcome::silent(4);
        assert_eq!(silent.slots, 4);
        assert!(silent.outputs.is_empty());
    }
}
