use super::{
    append_invocation_log, append_runtime_log, now_secs, sleep_with_stop, status, RuntimeError,
    StatePaths,
};
use crate::auth::{AccessToken, TokenGate};
use crate::config::Settings;
use crate::graphql::GraphqlClient;
use crate::handlers::{self, HandlerContext, HandlerError};
use crate::queue::{self, ClaimedEvent, ErrorReport, OutboundEvent, QueueError, QueuePaths};
use crate::shared::ids::new_request_id;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const QUEUE_MIN_POLL_MS: u64 = 100;
pub const QUEUE_MAX_POLL_MS: u64 = 1000;
pub const TOKEN_WAIT_MS: u64 = 5_000;

fn token_wait_timeout() -> Duration {
    let milliseconds = std::env::var("SPACEFLOW_TOKEN_WAIT_MS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(TOKEN_WAIT_MS);
    Duration::from_millis(milliseconds)
}

/// Claims and dispatches every queued event in arrival order. Returns the
/// number of events drained; each drained event ends up in `outgoing/` or
/// `errors/`, and a failed event never stops the drain.
pub fn drain_queue_once(
    state_root: &Path,
    settings: &Settings,
    gate: &TokenGate,
) -> Result<usize, RuntimeError> {
    let paths = StatePaths::new(state_root);
    let queue_paths = QueuePaths::from_state_root(state_root);
    drain_available(&paths, &queue_paths, settings, gate, None)
}

fn drain_available(
    paths: &StatePaths,
    queue_paths: &QueuePaths,
    settings: &Settings,
    gate: &TokenGate,
    stop: Option<&AtomicBool>,
) -> Result<usize, RuntimeError> {
    let mut drained = 0usize;
    loop {
        if stop.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false) {
            break;
        }
        match queue::claim_oldest(queue_paths) {
            Ok(Some(claimed)) => {
                process_claimed_event(paths, queue_paths, settings, gate, claimed)?;
                drained += 1;
            }
            Ok(None) => break,
            Err(err @ QueueError::Parse { .. }) => {
                // The offending file is already quarantined in errors/.
                append_runtime_log(paths, "warn", "queue.quarantined", &err.to_string());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(drained)
}

fn process_claimed_event(
    paths: &StatePaths,
    queue_paths: &QueuePaths,
    settings: &Settings,
    gate: &TokenGate,
    claimed: ClaimedEvent,
) -> Result<(), RuntimeError> {
    let handler_id = claimed.payload.handler.clone();
    let event_id = claimed.payload.event_id.clone();
    // Correlates every log line of this invocation.
    let request_id = new_request_id(now_secs());

    let config = match settings.handler(&handler_id) {
        Ok(config) => config,
        Err(err) => {
            return fail_claimed(
                paths,
                queue_paths,
                &claimed,
                &handler_id,
                &event_id,
                &request_id,
                &err.to_string(),
                status::StatusTone::Error,
            )
        }
    };

    let token = if config.needs_credential() {
        match gate.wait_for_token(token_wait_timeout()) {
            Some(token) => token,
            None => {
                return fail_claimed(
                    paths,
                    queue_paths,
                    &claimed,
                    &handler_id,
                    &event_id,
                    &request_id,
                    &HandlerError::TokenUnavailable.to_string(),
                    status::StatusTone::Waiting,
                )
            }
        }
    } else {
        // Routing-only handlers never reach the API; a held token is still
        // passed through so the context stays uniform.
        gate.current().unwrap_or_else(|| AccessToken::new(""))
    };

    let client = GraphqlClient::new(&settings.platform.host, &settings.platform.views);
    let ctx = HandlerContext::new(client, token, paths.root.clone());

    match handlers::dispatch(&ctx, &handler_id, config, &claimed.payload) {
        Ok(outcome) => {
            let now = now_secs();
            let outputs: Vec<OutboundEvent> = outcome
                .outputs
                .iter()
                .map(|routed| OutboundEvent {
                    event_id: event_id.clone(),
                    handler: handler_id.clone(),
                    slot: routed.slot,
                    slots: outcome.slots,
                    timestamp: now,
                    payload: routed.payload.clone(),
                })
                .collect();
            queue::complete_success(queue_paths, &claimed, &outputs)?;
            let _ = status::set_status(
                paths,
                &handler_id,
                status::StatusTone::Ok,
                &format!("processed event {event_id}"),
            );
            append_invocation_log(
                paths,
                "info",
                "queue.processed",
                &request_id,
                &format!(
                    "handler={handler_id} event={event_id} outputs={}/{}",
                    outputs.len(),
                    outcome.slots
                ),
            );
            Ok(())
        }
        Err(err) => fail_claimed(
            paths,
            queue_paths,
            &claimed,
            &handler_id,
            &event_id,
            &request_id,
            &err.to_string(),
            status::StatusTone::Error,
        ),
    }
}

/// Terminal failure path: error report file, status entry, log line. The
/// event is never retried.
fn fail_claimed(
    paths: &StatePaths,
    queue_paths: &QueuePaths,
    claimed: &ClaimedEvent,
    handler_id: &str,
    event_id: &str,
    request_id: &str,
    error: &str,
    tone: status::StatusTone,
) -> Result<(), RuntimeError> {
    let report = ErrorReport {
        event_id: event_id.to_string(),
        handler: handler_id.to_string(),
        error: error.to_string(),
        timestamp: now_secs(),
    };
    queue::complete_failure(queue_paths, claimed, &report)?;

    let status_text = match tone {
        status::StatusTone::Waiting => "waiting for access token".to_string(),
        _ => error.to_string(),
    };
    let _ = status::set_status(paths, handler_id, tone, &status_text);

    let level = match tone {
        status::StatusTone::Waiting => "warn",
        _ => "error",
    };
    append_invocation_log(
        paths,
        level,
        "queue.failed",
        request_id,
        &format!("handler={handler_id} event={event_id}: {error}"),
    );
    Ok(())
}

pub(crate) fn run_queue_worker_loop(
    state_root: PathBuf,
    settings: Settings,
    gate: Arc<TokenGate>,
    stop: Arc<AtomicBool>,
) {
    let paths = StatePaths::new(&state_root);
    let queue_paths = QueuePaths::from_state_root(&state_root);
    let mut backoff_ms = QUEUE_MIN_POLL_MS;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let drained = match drain_available(&paths, &queue_paths, &settings, &gate, Some(&stop)) {
            Ok(count) => count,
            Err(err) => {
                append_runtime_log(&paths, "error", "queue.worker", &err.to_string());
                0
            }
        };

        if drained > 0 {
            backoff_ms = QUEUE_MIN_POLL_MS;
            continue;
        }
        if !sleep_with_stop(&stop, Duration::from_millis(backoff_ms)) {
            break;
        }
        backoff_ms = (backoff_ms.saturating_mul(2)).min(QUEUE_MAX_POLL_MS);
    }

    append_runtime_log(&paths, "info", "worker.stopped", "queue worker stopped");
}
