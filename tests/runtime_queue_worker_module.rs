use spaceflow::auth::TokenGate;
use spaceflow::config::Settings;
use spaceflow::queue::{InboundEvent, OutboundEvent};
use spaceflow::runtime::{
    bootstrap_state_root, drain_queue_once, load_status_board, StatePaths, StatusTone,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn worker_settings() -> Settings {
    serde_yaml::from_str(
        r#"
platform:
  host: http://127.0.0.1:9
handlers:
  nlp:
    kind: annotation_filter
    outputs: "message-nlp-all, message-focus"
    nlp:
      entities: true
  announce:
    kind: message_post
    space_id: space-1
"#,
    )
    .expect("parse settings")
}

fn bootstrap(root: &Path) -> StatePaths {
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).expect("bootstrap");
    paths
}

fn write_incoming(root: &Path, name: &str, event: &InboundEvent) {
    fs::write(
        root.join("queue/incoming").join(name),
        serde_json::to_string(event).expect("encode event"),
    )
    .expect("write incoming");
}

fn annotation_event(event_id: &str) -> InboundEvent {
    let mut event = InboundEvent::new(event_id, "nlp", 1);
    event.annotation_type = Some("message-focus".to_string());
    event.payload = Some(json!({"body": "hi"}));
    event
}

#[test]
fn drain_returns_zero_on_an_empty_queue() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    bootstrap(&root);

    let drained =
        drain_queue_once(&root, &worker_settings(), &TokenGate::new()).expect("drain empty");
    assert_eq!(drained, 0);
}

#[test]
fn annotation_router_runs_without_a_credential() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    let paths = bootstrap(&root);
    write_incoming(&root, "evt-1.json", &annotation_event("evt-1"));

    // The gate is empty on purpose: routing-only handlers never wait on it.
    let drained = drain_queue_once(&root, &worker_settings(), &TokenGate::new()).expect("drain");
    assert_eq!(drained, 1);

    let raw = fs::read_to_string(root.join("queue/outgoing/nlp_evt-1_s1.json"))
        .expect("outgoing file");
    let output: OutboundEvent = serde_json::from_str(&raw).expect("decode outgoing");
    assert_eq!(output.slot, 1);
    assert_eq!(output.slots, 2);
    assert_eq!(output.payload, json!({"body": "hi"}));

    let board = load_status_board(&paths).expect("status board");
    let entry = board.entry("nlp").expect("nlp status");
    assert_eq!(entry.tone, StatusTone::Ok);
    assert_eq!(entry.text, "processed event evt-1");

    let log = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
    assert!(log.contains("queue.processed"));
    assert!(
        log.contains(r#""request":"req-"#),
        "invocation log lines carry a request id"
    );
}

#[test]
fn unknown_handler_fails_the_event_and_keeps_draining() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    let paths = bootstrap(&root);

    write_incoming(&root, "a.json", &InboundEvent::new("evt-a", "ghost", 1));
    std::thread::sleep(std::time::Duration::from_millis(5));
    write_incoming(&root, "b.json", &annotation_event("evt-b"));

    let drained = drain_queue_once(&root, &worker_settings(), &TokenGate::new()).expect("drain");
    assert_eq!(drained, 2);

    let report = fs::read_to_string(root.join("queue/errors/ghost_evt-a_error.json"))
        .expect("error report");
    assert!(report.contains("not configured"));
    assert!(root.join("queue/outgoing/nlp_evt-b_s1.json").exists());

    let board = load_status_board(&paths).expect("status board");
    assert_eq!(board.entry("ghost").expect("ghost status").tone, StatusTone::Error);

    let log = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
    assert!(log.contains("queue.failed"));
}

#[test]
fn token_wait_timeout_fails_the_claim_as_waiting() {
    let _env_guard = ENV_LOCK.lock().expect("env lock");
    std::env::set_var("SPACEFLOW_TOKEN_WAIT_MS", "50");

    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    let paths = bootstrap(&root);

    let mut event = InboundEvent::new("evt-w", "announce", 1);
    event.text = Some("hello".to_string());
    write_incoming(&root, "evt-w.json", &event);

    let drained = drain_queue_once(&root, &worker_settings(), &TokenGate::new()).expect("drain");
    assert_eq!(drained, 1);
    std::env::remove_var("SPACEFLOW_TOKEN_WAIT_MS");

    let report = fs::read_to_string(root.join("queue/errors/announce_evt-w_error.json"))
        .expect("error report");
    assert!(report.contains("no access token available"));

    let board = load_status_board(&paths).expect("status board");
    let entry = board.entry("announce").expect("announce status");
    assert_eq!(entry.tone, StatusTone::Waiting);
    assert_eq!(entry.text, "waiting for access token");
}

#[test]
fn unparsable_queue_file_is_quarantined_not_fatal() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    let paths = bootstrap(&root);

    fs::write(root.join("queue/incoming/junk.json"), "not json").expect("write junk");
    std::thread::sleep(std::time::Duration::from_millis(5));
    write_incoming(&root, "ok.json", &annotation_event("evt-1"));

    let drained = drain_queue_once(&root, &worker_settings(), &TokenGate::new()).expect("drain");
    assert_eq!(drained, 1);

    let quarantined: Vec<_> = fs::read_dir(root.join("queue/errors"))
        .expect("errors dir")
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert!(quarantined[0]
        .file_name()
        .to_string_lossy()
        .contains("quarantine"));
    assert!(root.join("queue/outgoing/nlp_evt-1_s1.json").exists());

    let log = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
    assert!(log.contains("queue.quarantined"));
}
