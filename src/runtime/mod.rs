use crate::auth::{TokenGate, ACCESS_TOKEN_ENV, TOKEN_FILE_NAME};
use crate::config::Settings;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub mod heartbeat_worker;
pub mod logging;
pub mod queue_worker;
pub mod state_paths;
pub mod status;

pub use crate::shared::errors::RuntimeError;
pub(crate) use crate::shared::fs_atomic::atomic_write_file;
pub(crate) use crate::shared::time::now_secs;
pub use heartbeat_worker::{configured_heartbeat_interval, tick_heartbeat};
pub use logging::{append_invocation_log, append_runtime_log};
pub use queue_worker::drain_queue_once;
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, StatePaths, DEFAULT_STATE_ROOT_DIR,
};
pub use status::{
    load_status_board, save_status_board, set_status, StatusBoard, StatusEntry, StatusTone,
    PLATFORM_STATUS_KEY,
};

/// Supervises the queue worker and the heartbeat until the stop-signal file
/// appears. The caller owns the settings; handlers re-read nothing.
pub fn run_loop(state_root: &Path, settings: Settings) -> Result<(), RuntimeError> {
    let paths = StatePaths::new(state_root);
    bootstrap_state_root(&paths)?;

    let stop_path = paths.stop_signal_path();
    if stop_path.exists() {
        let _ = fs::remove_file(&stop_path);
    }

    let gate = Arc::new(TokenGate::new());
    match tick_heartbeat(&paths, &gate) {
        Ok(true) => {}
        Ok(false) => append_runtime_log(
            &paths,
            "error",
            "auth.token.missing",
            &format!("no access token: set {ACCESS_TOKEN_ENV} or write runtime/{TOKEN_FILE_NAME}"),
        ),
        Err(err) => append_runtime_log(&paths, "error", "auth.token.error", &err.to_string()),
    }

    append_runtime_log(
        &paths,
        "info",
        "runtime.started",
        &format!(
            "pid={} handlers={}",
            std::process::id(),
            settings.handlers.len()
        ),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    handles.push(thread::spawn({
        let root = paths.root.clone();
        let settings = settings.clone();
        let gate = Arc::clone(&gate);
        let stop = Arc::clone(&stop);
        move || queue_worker::run_queue_worker_loop(root, settings, gate, stop)
    }));

    if let Some(interval) = configured_heartbeat_interval(&settings) {
        handles.push(thread::spawn({
            let root = paths.root.clone();
            let gate = Arc::clone(&gate);
            let stop = Arc::clone(&stop);
            move || heartbeat_worker::run_heartbeat_loop(root, interval, gate, stop)
        }));
    }

    while !stop.load(Ordering::Relaxed) {
        if paths.stop_signal_path().exists() {
            stop.store(true, Ordering::Relaxed);
            append_runtime_log(&paths, "info", "runtime.stop.signal", "stop file detected");
        }
        thread::sleep(Duration::from_millis(50));
    }

    for handle in handles {
        let _ = handle.join();
    }

    let _ = fs::remove_file(paths.stop_signal_path());
    append_runtime_log(&paths, "info", "runtime.stopped", "runtime stopped cleanly");
    Ok(())
}

pub(crate) fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::from_millis(0) {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(200));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Relaxed)
}
