use super::{append_runtime_log, sleep_with_stop, status, StatePaths};
use crate::auth::{self, AuthError, TokenGate};
use crate::config::Settings;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

pub fn configured_heartbeat_interval(settings: &Settings) -> Option<Duration> {
    let seconds = settings.monitoring.heartbeat_interval.unwrap_or(0);
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}

/// One heartbeat: re-read the provider drop point, reconcile the gate and
/// refresh the `platform` status entry. Returns whether the gate holds a
/// token afterwards.
pub fn tick_heartbeat(paths: &StatePaths, gate: &TokenGate) -> Result<bool, AuthError> {
    match auth::refresh_gate(&paths.root, gate) {
        Ok(true) => {
            let _ = status::set_status(
                paths,
                status::PLATFORM_STATUS_KEY,
                status::StatusTone::Ok,
                "access token available",
            );
            Ok(true)
        }
        Ok(false) => {
            let _ = status::set_status(
                paths,
                status::PLATFORM_STATUS_KEY,
                status::StatusTone::Waiting,
                "waiting for access token",
            );
            Ok(false)
        }
        Err(err) => {
            let _ = status::set_status(
                paths,
                status::PLATFORM_STATUS_KEY,
                status::StatusTone::Error,
                &err.to_string(),
            );
            Err(err)
        }
    }
}

pub(crate) fn run_heartbeat_loop(
    state_root: PathBuf,
    interval: Duration,
    gate: Arc<TokenGate>,
    stop: Arc<AtomicBool>,
) {
    let paths = StatePaths::new(&state_root);
    let mut had_token = gate.has_token();

    loop {
        match tick_heartbeat(&paths, &gate) {
            Ok(has_token) => {
                if has_token != had_token {
                    if has_token {
                        append_runtime_log(
                            &paths,
                            "info",
                            "auth.token.installed",
                            "provider credential installed",
                        );
                    } else {
                        append_runtime_log(
                            &paths,
                            "warn",
                            "auth.token.cleared",
                            "provider credential missing; gate cleared",
                        );
                    }
                    had_token = has_token;
                }
            }
            Err(err) => {
                append_runtime_log(&paths, "error", "auth.token.error", &err.to_string());
            }
        }

        if !sleep_with_stop(&stop, interval) {
            break;
        }
    }

    append_runtime_log(&paths, "info", "worker.stopped", "heartbeat worker stopped");
}
