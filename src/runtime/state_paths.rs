use super::RuntimeError;
use crate::config::SETTINGS_FILE_NAME;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.join("queue/incoming"),
            self.root.join("queue/processing"),
            self.root.join("queue/outgoing"),
            self.root.join("queue/errors"),
            self.root.join("logs"),
            self.root.join("runtime"),
        ]
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE_NAME)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("runtime")
    }

    pub fn status_board_path(&self) -> PathBuf {
        self.runtime_dir().join("status.json")
    }

    pub fn stop_signal_path(&self) -> PathBuf {
        self.runtime_dir().join("stop")
    }

    pub fn runtime_log_path(&self) -> PathBuf {
        self.root.join("logs/runtime.log")
    }
}

pub const DEFAULT_STATE_ROOT_DIR: &str = ".spaceflow";

pub fn default_state_root_path() -> Result<PathBuf, RuntimeError> {
    let home = std::env::var_os("HOME").ok_or(RuntimeError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), RuntimeError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| RuntimeError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
