use crate::config::Settings;
use crate::slack;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod logging;
pub mod queue_worker;
pub mod recovery;
pub mod state_paths;
pub mod supervisor;
pub mod worker_registry;

pub use logging::append_runtime_log;
pub use queue_worker::{drain_queue_once, drain_queue_once_with_binaries};
pub use recovery::recover_processing_queue_entries;
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, StatePaths, DEFAULT_STATE_ROOT_DIR,
};
pub use supervisor::{
    cleanup_stale_supervisor, clear_start_lock, is_process_alive, load_supervisor_state,
    reserve_start_lock, save_supervisor_state, signal_stop, spawn_supervisor_process,
    stop_active_supervisor, supervisor_ownership_state, write_supervisor_lock_pid, OwnershipState,
    StopResult, SupervisorState, WorkerHealth,
};
pub use worker_registry::{WorkerKind, WorkerRegistry, WorkerState};

const QUEUE_MAX_CONCURRENCY: usize = 4;
const QUEUE_MIN_POLL_MS: u64 = 100;
const QUEUE_MAX_POLL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingDefaults {
    pub queue_poll_interval_secs: u64,
    pub outbound_poll_interval_secs: u64,
}

impl Default for PollingDefaults {
    fn default() -> Self {
        Self {
            queue_poll_interval_secs: 1,
            outbound_poll_interval_secs: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create runtime path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve home directory for runtime state root")]
    HomeDirectoryUnavailable,
    #[error("failed to read runtime state {path}: {source}")]
    ReadState {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse runtime state {path}: {source}")]
    ParseState {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write runtime state {path}: {source}")]
    WriteState {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("supervisor is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("no running supervisor instance")]
    NotRunning,
    #[error("failed to read lock file {path}: {source}")]
    ReadLock {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write lock file {path}: {source}")]
    WriteLock {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn supervisor process: {0}")]
    Spawn(String),
    #[error("failed to stop supervisor process {pid}; process is still alive")]
    StopFailedAlive { pid: u32 },
}

#[derive(Debug, Clone)]
enum WorkerRuntime {
    QueueProcessor,
    OrchestratorDispatcher,
    Slack,
    Heartbeat,
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Started {
        worker_id: String,
        at: i64,
    },
    Heartbeat {
        worker_id: String,
        at: i64,
    },
    Error {
        worker_id: String,
        at: i64,
        message: String,
        fatal: bool,
    },
    Stopped {
        worker_id: String,
        at: i64,
    },
}

#[derive(Debug, Clone)]
struct WorkerSpec {
    id: String,
    runtime: WorkerRuntime,
    interval: Duration,
}

pub fn canonicalize_existing(path: &Path) -> Result<PathBuf, std::io::Error> {
    fs::canonicalize(path)
}

pub fn run_supervisor(state_root: &Path, settings: Settings) -> Result<(), RuntimeError> {
    let paths = StatePaths::new(state_root);
    bootstrap_state_root(&paths)?;

    let stop_path = paths.stop_signal_path();
    if stop_path.exists() {
        let _ = fs::remove_file(&stop_path);
    }

    let specs = build_worker_specs(&settings);
    let mut state = SupervisorState {
        running: true,
        pid: Some(std::process::id()),
        started_at: Some(now_secs()),
        stopped_at: None,
        workers: BTreeMap::new(),
        last_error: None,
    };

    for spec in &specs {
        state
            .workers
            .insert(spec.id.clone(), WorkerHealth::default());
    }
    save_supervisor_state(&paths, &state)?;
    append_runtime_log(
        &paths,
        "info",
        "supervisor.started",
        &format!("pid={} workers={}", std::process::id(), specs.len()),
    );

    let fail_worker = std::env::var("DIRECLAW_FAIL_WORKER").ok();
    let slow_shutdown_worker = std::env::var("DIRECLAW_SLOW_SHUTDOWN_WORKER").ok();
    let stop = Arc::new(AtomicBool::new(false));
    let (events_tx, events_rx) = mpsc::channel::<WorkerEvent>();
    let mut handles = Vec::new();
    let mut active = BTreeSet::new();

    for spec in specs {
        active.insert(spec.id.clone());
        let tx = events_tx.clone();
        let stop_flag = stop.clone();
        let root = paths.root.clone();
        let settings_clone = settings.clone();
        let should_fail = fail_worker
            .as_ref()
            .map(|id| id == &spec.id)
            .unwrap_or(false);
        let slow_shutdown = slow_shutdown_worker
            .as_ref()
            .map(|id| id == &spec.id)
            .unwrap_or(false);

        handles.push(thread::spawn(move || {
            run_worker(
                spec,
                root,
                settings_clone,
                stop_flag,
                tx,
                should_fail,
                slow_shutdown,
            )
        }));
    }
    drop(events_tx);

    while !stop.load(Ordering::Relaxed) {
        if paths.stop_signal_path().exists() {
            stop.store(true, Ordering::Relaxed);
            append_runtime_log(
                &paths,
                "info",
                "supervisor.stop.signal",
                "stop file detected",
            );
        }

        match events_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => apply_worker_event(&paths, &mut state, &mut active, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !active.is_empty() && std::time::Instant::now() < deadline {
        match events_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => apply_worker_event(&paths, &mut state, &mut active, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !active.is_empty() {
        let message = format!(
            "shutdown timeout waiting for workers: {}",
            active.iter().cloned().collect::<Vec<_>>().join(",")
        );
        state.last_error = Some(message.clone());
        for worker_id in &active {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.state = WorkerState::Error;
                worker.last_error = Some("shutdown timeout".to_string());
            }
        }
        append_runtime_log(&paths, "warn", "supervisor.shutdown.timeout", &message);
    }

    for handle in handles {
        let _ = handle.join();
    }

    state.running = false;
    state.pid = None;
    state.stopped_at = Some(now_secs());
    save_supervisor_state(&paths, &state)?;

    clear_start_lock(&paths);
    let _ = fs::remove_file(paths.stop_signal_path());
    append_runtime_log(
        &paths,
        "info",
        "supervisor.stopped",
        "runtime stopped cleanly",
    );
    Ok(())
}

fn apply_worker_event(
    paths: &StatePaths,
    state: &mut SupervisorState,
    active: &mut BTreeSet<String>,
    event: WorkerEvent,
) {
    match event {
        WorkerEvent::Started { worker_id, at } => {
            let entry = state.workers.entry(worker_id.clone()).or_default();
            entry.state = WorkerState::Running;
            entry.last_heartbeat = Some(at);
            append_runtime_log(paths, "info", "worker.started", &worker_id);
        }
        WorkerEvent::Heartbeat { worker_id, at } => {
            let entry = state.workers.entry(worker_id).or_default();
            if entry.state != WorkerState::Error {
                entry.state = WorkerState::Running;
            }
            entry.last_heartbeat = Some(at);
        }
        WorkerEvent::Error {
            worker_id,
            at,
            message,
            fatal,
        } => {
            let entry = state.workers.entry(worker_id.clone()).or_default();
            entry.state = WorkerState::Error;
            entry.last_heartbeat = Some(at);
            entry.last_error = Some(message.clone());
            append_runtime_log(
                paths,
                if fatal { "error" } else { "warn" },
                "worker.error",
                &format!("{}: {}", worker_id, message),
            );
        }
        WorkerEvent::Stopped { worker_id, at } => {
            let entry = state.workers.entry(worker_id.clone()).or_default();
            if entry.state != WorkerState::Error {
                entry.state = WorkerState::Stopped;
            }
            entry.last_heartbeat = Some(at);
            active.remove(&worker_id);
            append_runtime_log(paths, "info", "worker.stopped", &worker_id);
        }
    }

    let _ = save_supervisor_state(paths, state);
}

fn build_worker_specs(settings: &Settings) -> Vec<WorkerSpec> {
    let mut specs = Vec::new();
    specs.push(WorkerSpec {
        id: "queue_processor".to_string(),
        runtime: WorkerRuntime::QueueProcessor,
        interval: Duration::from_millis(250),
    });
    specs.push(WorkerSpec {
        id: "orchestrator_dispatcher".to_string(),
        runtime: WorkerRuntime::OrchestratorDispatcher,
        interval: Duration::from_secs(1),
    });

    if settings.monitoring.heartbeat_interval.unwrap_or(0) > 0 {
        specs.push(WorkerSpec {
            id: "heartbeat".to_string(),
            runtime: WorkerRuntime::Heartbeat,
            interval: Duration::from_secs(settings.monitoring.heartbeat_interval.unwrap_or(3600)),
        });
    }

    for (channel, config) in &settings.channels {
        if !config.enabled {
            continue;
        }
        if channel == "slack" {
            specs.push(WorkerSpec {
                id: format!("channel:{channel}"),
                runtime: WorkerRuntime::Slack,
                interval: Duration::from_secs(2),
            });
        }
    }

    specs
}

fn run_worker(
    spec: WorkerSpec,
    state_root: PathBuf,
    settings: Settings,
    stop: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
    should_fail: bool,
    slow_shutdown: bool,
) {
    let _ = events.send(WorkerEvent::Started {
        worker_id: spec.id.clone(),
        at: now_secs(),
    });

    if matches!(spec.runtime, WorkerRuntime::Slack) {
        if let Err(err) = slack::validate_startup_credentials(&settings) {
            let _ = events.send(WorkerEvent::Error {
                worker_id: spec.id.clone(),
                at: now_secs(),
                message: err.to_string(),
                fatal: true,
            });
            let _ = events.send(WorkerEvent::Stopped {
                worker_id: spec.id,
                at: now_secs(),
            });
            return;
        }
    }

    if should_fail {
        let _ = events.send(WorkerEvent::Error {
            worker_id: spec.id.clone(),
            at: now_secs(),
            message: "fault injection requested".to_string(),
            fatal: true,
        });
        let _ = events.send(WorkerEvent::Stopped {
            worker_id: spec.id,
            at: now_secs(),
        });
        return;
    }

    if matches!(spec.runtime, WorkerRuntime::QueueProcessor) {
        queue_worker::run_queue_processor_loop(
            spec.id,
            state_root,
            settings,
            stop,
            events,
            slow_shutdown,
            QUEUE_MAX_CONCURRENCY,
        );
        return;
    }

    loop {
        if stop.load(Ordering::Relaxed) {
            if slow_shutdown {
                thread::sleep(Duration::from_secs(6));
            }
            break;
        }

        let tick = match spec.runtime {
            WorkerRuntime::QueueProcessor => Ok(()),
            WorkerRuntime::OrchestratorDispatcher => Ok(()),
            WorkerRuntime::Slack => tick_slack_worker(&state_root, &settings),
            WorkerRuntime::Heartbeat => Ok(()),
        };

        match tick {
            Ok(()) => {
                let _ = events.send(WorkerEvent::Heartbeat {
                    worker_id: spec.id.clone(),
                    at: now_secs(),
                });
            }
            Err(message) => {
                let _ = events.send(WorkerEvent::Error {
                    worker_id: spec.id.clone(),
                    at: now_secs(),
                    message,
                    fatal: false,
                });
            }
        }

        if !sleep_with_stop(&stop, spec.interval) {
            if slow_shutdown {
                thread::sleep(Duration::from_secs(6));
            }
            break;
        }
    }

    let _ = events.send(WorkerEvent::Stopped {
        worker_id: spec.id,
        at: now_secs(),
    });
}

fn tick_slack_worker(state_root: &Path, settings: &Settings) -> Result<(), String> {
    slack::sync_once(state_root, settings)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
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

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("state"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    sync_parent_dir(parent)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}
