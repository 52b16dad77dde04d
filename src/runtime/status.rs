use super::{atomic_write_file, now_secs, RuntimeError, StatePaths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Mutex;

/// Board key for the credential heartbeat; handler keys are handler ids.
pub const PLATFORM_STATUS_KEY: &str = "platform";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Ok,
    Error,
    Waiting,
}

impl StatusTone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Waiting => "waiting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub tone: StatusTone,
    pub text: String,
    pub at: i64,
}

/// Persisted indicator board mirrored to `runtime/status.json`. One entry
/// per handler plus the `platform` entry owned by the heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusBoard {
    pub entries: BTreeMap<String, StatusEntry>,
}

impl StatusBoard {
    pub fn entry(&self, key: &str) -> Option<&StatusEntry> {
        self.entries.get(key)
    }
}

pub fn load_status_board(paths: &StatePaths) -> Result<StatusBoard, RuntimeError> {
    let path = paths.status_board_path();
    if !path.exists() {
        return Ok(StatusBoard::default());
    }
    let raw = fs::read_to_string(&path).map_err(|source| RuntimeError::ReadState {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RuntimeError::ParseState {
        path: path.display().to_string(),
        source,
    })
}

pub fn save_status_board(paths: &StatePaths, board: &StatusBoard) -> Result<(), RuntimeError> {
    let path = paths.status_board_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RuntimeError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let encoded = serde_json::to_vec_pretty(board).map_err(|source| RuntimeError::ParseState {
        path: path.display().to_string(),
        source,
    })?;
    atomic_write_file(&path, &encoded).map_err(|source| RuntimeError::WriteState {
        path: path.display().to_string(),
        source,
    })
}

// Serializes the load-modify-save cycle: the queue worker and the heartbeat
// write the board concurrently, and the atomic file write alone cannot stop
// a racing pair from dropping one entry's update.
static BOARD_WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Upserts one board entry, stamped with the current time.
pub fn set_status(
    paths: &StatePaths,
    key: &str,
    tone: StatusTone,
    text: &str,
) -> Result<(), RuntimeError> {
    let _guard = BOARD_WRITE_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    let mut board = load_status_board(paths)?;
    board.entries.insert(
        key.to_string(),
        StatusEntry {
            tone,
            text: text.to_string(),
            at: now_secs(),
        },
    );
    save_status_board(paths, &board)
}
