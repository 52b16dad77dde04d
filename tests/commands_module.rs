use spaceflow::auth::ACCESS_TOKEN_ENV;
use spaceflow::commands::run_cli;
use spaceflow::queue::InboundEvent;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn cli(args: &[&str]) -> Result<String, String> {
    run_cli(args.iter().map(|arg| arg.to_string()).collect())
}

fn write_config(root: &Path) {
    fs::create_dir_all(root).expect("state root");
    fs::write(
        root.join("config.yaml"),
        r#"platform:
  host: http://127.0.0.1:9
handlers:
  nlp:
    kind: annotation_filter
    outputs: "message-nlp-all, message-focus"
"#,
    )
    .expect("write config");
}

fn write_annotation_event(root: &Path, event_id: &str) {
    let mut event = InboundEvent::new(event_id, "nlp", 1);
    event.annotation_type = Some("message-focus".to_string());
    event.payload = Some(json!({"body": "hi"}));
    fs::create_dir_all(root.join("queue/incoming")).expect("incoming dir");
    fs::write(
        root.join("queue/incoming").join(format!("{event_id}.json")),
        serde_json::to_string(&event).expect("encode event"),
    )
    .expect("write incoming");
}

#[test]
fn drain_then_doctor_reflect_queue_activity() {
    let _env_guard = ENV_LOCK.lock().expect("env lock");
    std::env::remove_var(ACCESS_TOKEN_ENV);

    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    write_config(&root);
    write_annotation_event(&root, "evt-1");
    let root_str = root.display().to_string();

    let output = cli(&["drain", "--state-root", &root_str]).expect("drain");
    assert!(output.starts_with("drained"));
    assert!(output.contains("events=1"));
    assert!(root.join("queue/outgoing/nlp_evt-1_s1.json").exists());

    let report = cli(&["doctor", "--state-root", &root_str]).expect("doctor");
    assert!(report.contains("check:config.parse=ok"));
    assert!(report.contains("check:config.handlers=ok"));
    assert!(report.contains("check:state.root=ok"));
    assert!(report.contains("summary=unhealthy"));
    assert!(report.contains("check:auth.credential=fail"));
    assert!(report.contains("status:nlp=ok processed event evt-1"));
}

#[test]
fn drain_without_a_config_is_an_error() {
    let _env_guard = ENV_LOCK.lock().expect("env lock");
    std::env::remove_var(ACCESS_TOKEN_ENV);

    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    let root_str = root.display().to_string();

    let err = cli(&["drain", "--state-root", &root_str]).expect_err("missing config");
    assert!(err.contains("failed to read"));
}

#[test]
fn run_command_stops_on_the_stop_signal_file() {
    let _env_guard = ENV_LOCK.lock().expect("env lock");
    std::env::remove_var(ACCESS_TOKEN_ENV);

    let dir = tempdir().expect("tempdir");
    let root = dir.path().join(".spaceflow");
    write_config(&root);
    let root_str = root.display().to_string();

    let handle = thread::spawn(move || cli(&["run", "--state-root", &root_str]));

    let log_path = root.join("logs/runtime.log");
    for _ in 0..100 {
        if log_path.exists() {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert!(log_path.exists(), "runtime should have started");

    fs::write(root.join("runtime/stop"), b"").expect("write stop signal");
    for _ in 0..100 {
        if handle.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    let output = handle.join().expect("join run").expect("run exits cleanly");
    assert!(output.contains("runtime stopped"));
    assert!(
        !root.join("runtime/stop").exists(),
        "the stop signal is consumed on shutdown"
    );
}
