use super::{missing_field, HandlerContext, HandlerError, HandlerOutcome};
use crate::config::{split_csv, PersonLookupConfig};
use crate::graphql::ops::{self, Person};
use crate::queue::InboundEvent;
use crate::shared::logging::log_flow;
use serde_json::json;
use std::sync::mpsc;
use std::thread;

/// Looks up N people concurrently, one thread per lookup, and emits the
/// successes as a single combined payload in input order. A failed lookup
/// is logged and dropped; it never aborts its siblings.
pub fn run(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &PersonLookupConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let people = lookup_list(config, event);
    if people.is_empty() {
        return Err(missing_field(handler_id, "people"));
    }
    let lookup = config.lookup_by;

    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::with_capacity(people.len());
    for (index, needle) in people.iter().cloned().enumerate() {
        let tx = tx.clone();
        let client = ctx.client.clone();
        let token = ctx.token.clone();
        workers.push(thread::spawn(move || {
            let result = ops::fetch_person(&client, &token, lookup, &needle);
            let _ = tx.send((index, needle, result));
        }));
    }
    drop(tx);

    // Join barrier: the channel closes once every worker has reported.
    let mut results: Vec<Option<Person>> = vec![None; people.len()];
    for (index, needle, result) in rx.iter() {
        match result {
            Ok(person) => results[index] = Some(person),
            Err(err) => log_flow(
                &ctx.state_root,
                &format!("handler `{handler_id}` person lookup `{needle}` failed: {err}"),
            ),
        }
    }
    for worker in workers {
        let _ = worker.join();
    }

    let found: Vec<Person> = results.into_iter().flatten().collect();
    Ok(HandlerOutcome::single(json!({ "people": found })))
}

/// Config list wins when present and non-empty; the event list is the
/// fallback. Entries are trimmed, empties dropped.
fn lookup_list(config: &PersonLookupConfig, event: &InboundEvent) -> Vec<String> {
    let configured = config.people.as_deref().map(split_csv).unwrap_or_default();
    if !configured.is_empty() {
        return configured;
    }
    event
        .people
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupKey;

    fn event_with_people(people: &[&str]) -> InboundEvent {
        let mut event = InboundEvent::new("evt-1", "who", 1);
        event.people = people.iter().map(|p| p.to_string()).collect();
        event
    }

    #[test]
    fn config_list_takes_precedence_over_event() {
        let config = PersonLookupConfig {
            people: Some(" a, b ".to_string()),
            lookup_by: LookupKey::Id,
        };
        let list = lookup_list(&config, &event_with_people(&["x", "y"]));
        assert_eq!(list, vec!["a", "b"]);
    }

    #[test]
    fn blank_config_list_falls_back_to_event() {
        let config = PersonLookupConfig {
            people: Some("  ,  ".to_string()),
            lookup_by: LookupKey::Id,
        };
        let list = lookup_list(&config, &event_with_people(&[" x ", "", "y"]));
        assert_eq!(list, vec!["x", "y"]);
    }

    #[test]
    fn empty_lists_everywhere_are_a_configuration_error() {
        let ctx = HandlerContext::new(
            crate::graphql::GraphqlClient::new(
                "http://127.0.0.1:9",
                &[crate::graphql::ApiView::Public],
            ),
            crate::auth::AccessToken::new("t"),
            std::env::temp_dir(),
        );
        let config = PersonLookupConfig::default();
        let err = run(&ctx, "who", &config, &event_with_people(&[]))
            .expect_err("no people anywhere");
        assert!(matches!(err, HandlerError::MissingField { ref field, .. } if field == "people"));
    }
}
