use super::{
    decode_annotation, missing_field, non_empty, passthrough_payload, HandlerContext, HandlerError,
    HandlerOutcome,
};
use crate::config::{split_csv, AnnotationFilterConfig, NlpFlags};
use crate::queue::InboundEvent;
use crate::shared::logging::log_flow;

/// Output label folding the enabled NLP subtypes into one slot.
pub const NLP_AGGREGATE_LABEL: &str = "message-nlp-all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Named(String),
    NlpAggregate,
}

/// Parses the ordered output labels; position is the output slot.
pub fn parse_targets(raw: &str) -> Vec<OutputTarget> {
    split_csv(raw)
        .into_iter()
        .map(|label| {
            if label == NLP_AGGREGATE_LABEL {
                OutputTarget::NlpAggregate
            } else {
                OutputTarget::Named(label)
            }
        })
        .collect()
}

/// Whether `kind` is an NLP subtype, and whether its flag admits it.
/// Returns `None` for non-NLP annotation types.
fn nlp_enabled(flags: &NlpFlags, kind: &str) -> Option<bool> {
    let enabled = match kind {
        "message-nlp-keywords" => flags.keywords,
        "message-nlp-entities" => flags.entities,
        "message-nlp-docSentiment" => flags.doc_sentiment,
        "message-nlp-relations" => flags.relations,
        "message-nlp-concepts" => flags.concepts,
        "message-nlp-dates" => flags.dates,
        _ => return None,
    };
    Some(enabled)
}

/// The annotation type under inspection: the event's explicit field, else
/// the `type` of its decoded annotation payload.
fn annotation_kind(event: &InboundEvent) -> Option<String> {
    if let Some(kind) = non_empty(event.annotation_type.as_deref()) {
        return Some(kind);
    }
    let raw = event.annotation_payload.as_deref()?;
    decode_annotation(raw)?.kind
}

/// Routes an annotation event to the slot of the first matching output
/// label. An unmatched type is logged and emits nothing; that is a normal
/// outcome, not an error.
pub fn run(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &AnnotationFilterConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    if !config.multi_output {
        return Ok(HandlerOutcome::single(passthrough_payload(event)));
    }

    let targets = parse_targets(&config.outputs);
    if targets.is_empty() {
        return Err(missing_field(handler_id, "outputs"));
    }
    let slots = targets.len();

    let Some(kind) = annotation_kind(event) else {
        log_flow(
            &ctx.state_root,
            &format!("handler `{handler_id}` dropped an event without an annotation type"),
        );
        return Ok(HandlerOutcome::silent(slots));
    };

    for (slot, target) in targets.iter().enumerate() {
        let hit = match target {
            OutputTarget::Named(label) => label == &kind,
            OutputTarget::NlpAggregate => nlp_enabled(&config.nlp, &kind).unwrap_or(false),
        };
        if hit {
            return Ok(HandlerOutcome::routed(
                slot,
                slots,
                passthrough_payload(event),
            ));
        }
    }

    log_flow(
        &ctx.state_root,
        &format!("handler `{handler_id}` dropped annotation type `{kind}` (no matching output)"),
    );
    Ok(HandlerOutcome::silent(slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessToken;
    use crate::graphql::{ApiView, GraphqlClient};
    use serde_json::json;
    use tempfile::tempdir;

    fn ctx(state_root: &std::path::Path) -> HandlerContext {
        HandlerContext::new(
            GraphqlClient::new("http://127.0.0.1:9", &[ApiView::Public]),
            AccessToken::new("test-token"),
            state_root.to_path_buf(),
        )
    }

    fn annotation_event(kind: Option<&str>) -> InboundEvent {
        let mut event = InboundEvent::new("evt-1", "nlp", 1);
        event.annotation_type = kind.map(str::to_string);
        event.payload = Some(json!({"body": "hi"}));
        event
    }

    fn filter(outputs: &str, nlp: NlpFlags) -> AnnotationFilterConfig {
        AnnotationFilterConfig {
            multi_output: true,
            outputs: outputs.to_string(),
            nlp,
        }
    }

    #[test]
    fn labels_parse_with_aggregate_sentinel() {
        let targets = parse_targets("message-nlp-all, message-focus");
        assert_eq!(
            targets,
            vec![
                OutputTarget::NlpAggregate,
                OutputTarget::Named("message-focus".to_string()),
            ]
        );
    }

    #[test]
    fn disabled_multi_output_passes_through_on_single_slot() {
        let dir = tempdir().expect("tempdir");
        let config = AnnotationFilterConfig {
            multi_output: false,
            outputs: String::new(),
            nlp: NlpFlags::default(),
        };
        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(Some("anything")),
        )
        .expect("run");
        assert_eq!(outcome.slots, 1);
        assert_eq!(outcome.outputs[0].slot, 0);
        assert_eq!(outcome.outputs[0].payload, json!({"body": "hi"}));
    }

    #[test]
    fn aggregate_routes_enabled_subtype_to_its_slot() {
        let dir = tempdir().expect("tempdir");
        let flags = NlpFlags {
            entities: true,
            ..NlpFlags::default()
        };
        let config = filter("message-nlp-all, other", flags);

        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(Some("message-nlp-entities")),
        )
        .expect("run");
        assert_eq!(outcome.slots, 2);
        assert_eq!(outcome.outputs[0].slot, 0);

        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(Some("other")),
        )
        .expect("run");
        assert_eq!(outcome.outputs[0].slot, 1);
    }

    #[test]
    fn disabled_subtype_does_not_hit_the_aggregate() {
        let dir = tempdir().expect("tempdir");
        let flags = NlpFlags {
            entities: true,
            ..NlpFlags::default()
        };
        let config = filter("message-nlp-all", flags);
        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(Some("message-nlp-keywords")),
        )
        .expect("run");
        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.slots, 1);
    }

    #[test]
    fn unknown_type_is_dropped_and_logged() {
        let dir = tempdir().expect("tempdir");
        let config = filter("message-focus", NlpFlags::default());
        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(Some("message-nlp-entities")),
        )
        .expect("run");
        assert!(outcome.outputs.is_empty());

        let log = std::fs::read_to_string(dir.path().join("logs/flow.log")).expect("flow log");
        assert!(log.contains("message-nlp-entities"));
    }

    #[test]
    fn type_falls_back_to_decoded_annotation_payload() {
        let dir = tempdir().expect("tempdir");
        let mut event = annotation_event(None);
        event.annotation_payload =
            Some(r#"{"type":"message-focus","lens":"l"}"#.to_string());
        let config = filter("message-focus", NlpFlags::default());
        let outcome = run(&ctx(dir.path()), "nlp", &config, &event).expect("run");
        assert_eq!(outcome.outputs[0].slot, 0);
    }

    #[test]
    fn missing_type_everywhere_emits_nothing() {
        let dir = tempdir().expect("tempdir");
        let config = filter("message-focus", NlpFlags::default());
        let outcome = run(
            &ctx(dir.path()),
            "nlp",
            &config,
            &annotation_event(None),
        )
        .expect("run");
        assert!(outcome.outputs.is_empty());
    }
}
