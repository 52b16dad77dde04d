use super::{
    decode_annotation, decode_nested_fields, missing_field, non_empty, passthrough_payload,
    HandlerContext, HandlerError, HandlerOutcome, FOCUS_ANNOTATION_TYPE,
};
use crate::config::{split_csv, ActionFilterConfig};
use crate::graphql::ops;
use crate::queue::InboundEvent;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Trailing ` (lens)` marker on a rule element.
const LENS_SUFFIX_PATTERN: &str = r"^(.*)\s\((.*)\)$";

/// Shared lens-suffix matcher; the pattern is a constant, so it compiles once
/// for the whole process instead of once per event.
fn lens_suffix() -> Result<&'static Regex, HandlerError> {
    static LENS_SUFFIX: OnceLock<Regex> = OnceLock::new();
    if let Some(matcher) = LENS_SUFFIX.get() {
        return Ok(matcher);
    }
    let matcher = compile(LENS_SUFFIX_PATTERN)?;
    Ok(LENS_SUFFIX.get_or_init(|| matcher))
}

/// One parsed rule: its position in the list is its output slot and its
/// match priority.
#[derive(Debug, Clone)]
pub struct ActionRule {
    pub pattern: String,
    pub lens: Option<String>,
    matcher: Regex,
}

impl ActionRule {
    pub fn matches(&self, action_id: &str) -> bool {
        self.matcher.is_match(action_id)
    }
}

/// Parses the ordered comma-separated rule list. `*` matches any substring;
/// everything else in a pattern is literal.
pub fn parse_rules(raw: &str) -> Result<Vec<ActionRule>, HandlerError> {
    let lens_suffix = lens_suffix()?;
    split_csv(raw)
        .into_iter()
        .map(|element| parse_rule(lens_suffix, &element))
        .collect()
}

fn parse_rule(lens_suffix: &Regex, element: &str) -> Result<ActionRule, HandlerError> {
    let (pattern, lens) = match lens_suffix.captures(element) {
        Some(captures) => (
            captures[1].to_string(),
            Some(captures[2].to_string()),
        ),
        None => (element.to_string(), None),
    };
    let matcher = compile(&wildcard_pattern(&pattern))?;
    Ok(ActionRule {
        pattern,
        lens,
        matcher,
    })
}

fn compile(pattern: &str) -> Result<Regex, HandlerError> {
    Regex::new(pattern).map_err(|source| HandlerError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Anchored regex for a `*`-wildcard pattern; regex metacharacters in the
/// literal parts are escaped.
fn wildcard_pattern(pattern: &str) -> String {
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{escaped}$")
}

/// Routes an action event to the slot of the first matching rule, resolving
/// lens-qualified rules through the referral message's annotations. Arity is
/// `rules + 1`; the extra slot is the implicit otherwise output.
pub fn run(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &ActionFilterConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let action_id = non_empty(event.action_id.as_deref())
        .ok_or_else(|| missing_field(handler_id, "actionId"))?;
    let rules = parse_rules(&config.actions)?;
    if rules.is_empty() {
        return Err(missing_field(handler_id, "actions"));
    }
    let slots = rules.len() + 1;

    let Some(slot) = rules.iter().position(|rule| rule.matches(&action_id)) else {
        return Ok(HandlerOutcome::routed(
            rules.len(),
            slots,
            passthrough_payload(event),
        ));
    };

    match &rules[slot].lens {
        None => Ok(HandlerOutcome::routed(
            slot,
            slots,
            passthrough_payload(event),
        )),
        Some(lens) => {
            let message_id = non_empty(config.referral_message_id.as_deref())
                .or_else(|| non_empty(event.referral_message_id.as_deref()))
                .ok_or_else(|| missing_field(handler_id, "referralMessageId"))?;
            let annotations =
                ops::fetch_message_annotations(&ctx.client, &ctx.token, &message_id)?;
            let focus = find_focus_annotation(&annotations, lens).ok_or_else(|| {
                HandlerError::LensNotFound {
                    lens: lens.clone(),
                    message_id: message_id.clone(),
                }
            })?;
            Ok(HandlerOutcome::routed(slot, slots, focus))
        }
    }
}

/// First focus annotation carrying the wanted lens, nested fields decoded.
/// Annotations that fail to decode are passed over.
fn find_focus_annotation(annotations: &[String], lens: &str) -> Option<Value> {
    for raw in annotations {
        let Some(mut annotation) = decode_annotation(raw) else {
            continue;
        };
        if annotation.kind.as_deref() != Some(FOCUS_ANNOTATION_TYPE)
            || annotation.lens.as_deref() != Some(lens)
        {
            continue;
        }
        decode_nested_fields(&mut annotation);
        return serde_json::to_value(annotation).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessToken;
    use crate::graphql::{ApiView, GraphqlClient};
    use serde_json::json;

    fn ctx() -> HandlerContext {
        HandlerContext::new(
            GraphqlClient::new("http://127.0.0.1:9", &[ApiView::Public]),
            AccessToken::new("test-token"),
            std::env::temp_dir(),
        )
    }

    fn action_event(action_id: &str) -> InboundEvent {
        let mut event = InboundEvent::new("evt-1", "triage", 1);
        event.action_id = Some(action_id.to_string());
        event.payload = Some(json!({"original": true}));
        event
    }

    fn filter(actions: &str) -> ActionFilterConfig {
        ActionFilterConfig {
            actions: actions.to_string(),
            referral_message_id: None,
        }
    }

    #[test]
    fn rules_parse_lens_suffix_and_order() {
        let rules = parse_rules("approve, reject (confirmLens), other*").expect("parse");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].pattern, "approve");
        assert!(rules[0].lens.is_none());
        assert_eq!(rules[1].pattern, "reject");
        assert_eq!(rules[1].lens.as_deref(), Some("confirmLens"));
        assert_eq!(rules[2].pattern, "other*");
    }

    #[test]
    fn lens_suffix_matcher_is_shared_across_calls() {
        let first = lens_suffix().expect("compile");
        let second = lens_suffix().expect("compile");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn plain_pattern_is_exact_not_prefix() {
        let rules = parse_rules("approve").expect("parse");
        assert!(rules[0].matches("approve"));
        assert!(!rules[0].matches("approval"));
        assert!(!rules[0].matches("preapprove"));
    }

    #[test]
    fn wildcard_matches_any_substring() {
        let rules = parse_rules("bird*, *bird*").expect("parse");
        assert!(rules[0].matches("bird123"));
        assert!(rules[0].matches("birds"));
        assert!(rules[0].matches("bird"));
        assert!(!rules[0].matches("abird"));
        assert!(rules[1].matches("123bird123"));
        assert!(rules[1].matches("bird"));
        assert!(!rules[1].matches("b1rd"));
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        let rules = parse_rules("a.b*").expect("parse");
        assert!(rules[0].matches("a.b-tail"));
        assert!(!rules[0].matches("aXb-tail"));
    }

    #[test]
    fn first_matching_rule_takes_the_slot() {
        let outcome = run(
            &ctx(),
            "triage",
            &filter("app*, approve"),
            &action_event("approve"),
        )
        .expect("run");
        assert_eq!(outcome.slots, 3);
        assert_eq!(outcome.outputs[0].slot, 0);
        assert_eq!(outcome.outputs[0].payload, json!({"original": true}));
    }

    #[test]
    fn unmatched_action_lands_on_otherwise_slot() {
        let outcome = run(
            &ctx(),
            "triage",
            &filter("bar, baz (l)"),
            &action_event("foo"),
        )
        .expect("run");
        assert_eq!(outcome.slots, 3);
        assert_eq!(outcome.outputs[0].slot, 2);
        assert_eq!(outcome.outputs[0].payload, json!({"original": true}));
    }

    #[test]
    fn missing_action_id_is_a_configuration_error() {
        let mut event = action_event("x");
        event.action_id = Some("   ".to_string());
        let err = run(&ctx(), "triage", &filter("a"), &event).expect_err("missing actionId");
        assert!(matches!(err, HandlerError::MissingField { ref field, .. } if field == "actionId"));
    }

    #[test]
    fn empty_rule_list_is_a_configuration_error() {
        let err = run(&ctx(), "triage", &filter(" , "), &action_event("x"))
            .expect_err("no rules");
        assert!(matches!(err, HandlerError::MissingField { ref field, .. } if field == "actions"));
    }

    #[test]
    fn lens_match_without_referral_message_is_an_error() {
        let err = run(
            &ctx(),
            "triage",
            &filter("reject (confirmLens)"),
            &action_event("reject"),
        )
        .expect_err("no referral message");
        assert!(
            matches!(err, HandlerError::MissingField { ref field, .. } if field == "referralMessageId")
        );
    }

    #[test]
    fn focus_annotation_scan_matches_type_and_lens() {
        let annotations = vec![
            r#"{"type":"message-nlp-keywords","lens":"confirm"}"#.to_string(),
            "broken".to_string(),
            r#"{"type":"message-focus","lens":"other"}"#.to_string(),
            r#"{"type":"message-focus","lens":"confirm","payload":"{\"ok\":true}"}"#.to_string(),
        ];
        let focus = find_focus_annotation(&annotations, "confirm").expect("focus");
        assert_eq!(focus["lens"], json!("confirm"));
        assert_eq!(focus["payload"], json!({"ok": true}));

        assert!(find_focus_annotation(&annotations, "missing").is_none());
    }
}
