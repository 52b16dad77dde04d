use super::{
    error_filename, is_valid_queue_json_filename, outgoing_filename, ErrorReport, InboundEvent,
    OutboundEvent, QueueError, QueuePaths,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct ClaimedEvent {
    pub incoming_path: PathBuf,
    pub processing_path: PathBuf,
    pub payload: InboundEvent,
}

/// Claims the oldest incoming event by renaming it into `processing/`.
///
/// The rename is the ownership transfer; a file another worker moved first
/// is skipped. Unreadable or unparsable files are quarantined into
/// `errors/` so they never wedge the queue.
pub fn claim_oldest(paths: &QueuePaths) -> Result<Option<ClaimedEvent>, QueueError> {
    for incoming_path in sorted_incoming_paths(&paths.incoming)? {
        let Some(file_name) = incoming_path.file_name() else {
            continue;
        };
        let processing_path = paths.processing.join(file_name);

        match fs::rename(&incoming_path, &processing_path) {
            Ok(_) => {
                let raw = match fs::read_to_string(&processing_path) {
                    Ok(raw) => raw,
                    Err(err) => {
                        quarantine_processing_file(paths, &processing_path)?;
                        return Err(io_err(&processing_path, err));
                    }
                };
                let payload: InboundEvent = match serde_json::from_str(&raw) {
                    Ok(payload) => payload,
                    Err(err) => {
                        quarantine_processing_file(paths, &processing_path)?;
                        return Err(parse_err(&processing_path, err));
                    }
                };
                return Ok(Some(ClaimedEvent {
                    incoming_path,
                    processing_path,
                    payload,
                }));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&incoming_path, err)),
        }
    }

    Ok(None)
}

/// Writes one outgoing file per routed output, then releases the claim.
pub fn complete_success(
    paths: &QueuePaths,
    claimed: &ClaimedEvent,
    outputs: &[OutboundEvent],
) -> Result<Vec<PathBuf>, QueueError> {
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let filename = outgoing_filename(&output.handler, &output.event_id, output.slot);
        let out_path = paths.outgoing.join(filename);
        let body = serde_json::to_string_pretty(output).map_err(|e| parse_err(&out_path, e))?;
        fs::write(&out_path, body).map_err(|e| io_err(&out_path, e))?;
        written.push(out_path);
    }
    fs::remove_file(&claimed.processing_path).map_err(|e| io_err(&claimed.processing_path, e))?;
    Ok(written)
}

/// Records a terminal failure and releases the claim; the event is not
/// retried.
pub fn complete_failure(
    paths: &QueuePaths,
    claimed: &ClaimedEvent,
    report: &ErrorReport,
) -> Result<PathBuf, QueueError> {
    let out_path = paths
        .errors
        .join(error_filename(&report.handler, &report.event_id));
    let body = serde_json::to_string_pretty(report).map_err(|e| parse_err(&out_path, e))?;
    fs::write(&out_path, body).map_err(|e| io_err(&out_path, e))?;
    fs::remove_file(&claimed.processing_path).map_err(|e| io_err(&claimed.processing_path, e))?;
    Ok(out_path)
}

fn io_err(path: &Path, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn parse_err(path: &Path, source: serde_json::Error) -> QueueError {
    QueueError::Parse {
        path: path.display().to_string(),
        source,
    }
}

fn sorted_incoming_paths(incoming_dir: &Path) -> Result<Vec<PathBuf>, QueueError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(incoming_dir).map_err(|e| io_err(incoming_dir, e))? {
        let entry = entry.map_err(|e| io_err(incoming_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !is_valid_queue_json_filename(name) {
                continue;
            }
        }

        let metadata = entry.metadata().map_err(|e| io_err(&path, e))?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((modified, path));
    }

    entries.sort_by(|(a_time, a_path), (b_time, b_path)| {
        a_time
            .cmp(b_time)
            .then_with(|| a_path.file_name().cmp(&b_path.file_name()))
    });

    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

static QUARANTINE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_quarantine_name(original_name: &str) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("event");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let counter = QUARANTINE_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    format!("{stem}_quarantine_{counter}.{ext}")
}

fn quarantine_processing_file(
    paths: &QueuePaths,
    processing_path: &Path,
) -> Result<PathBuf, QueueError> {
    let file_name = processing_path.file_name().ok_or_else(|| {
        io_err(
            processing_path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "processing file missing name",
            ),
        )
    })?;
    let file_name = file_name.to_string_lossy();
    let quarantined = paths.errors.join(unique_quarantine_name(&file_name));
    fs::rename(processing_path, &quarantined).map_err(|e| io_err(processing_path, e))?;
    Ok(quarantined)
}
