use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn flow_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/flow.log")
}

pub fn append_flow_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = flow_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{line}")
}

/// Best-effort logging for call sites that must never fail on a log write.
pub fn log_flow(state_root: &Path, line: &str) {
    let stamped = format!("{} {line}", crate::shared::time::log_timestamp());
    let _ = append_flow_log_line(state_root, &stamped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flow_log_lines_accumulate_in_order() {
        let dir = tempdir().expect("tempdir");
        append_flow_log_line(dir.path(), "first").expect("append");
        append_flow_log_line(dir.path(), "second").expect("append");
        let body = fs::read_to_string(flow_log_path(dir.path())).expect("read log");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn best_effort_logging_prefixes_a_timestamp() {
        let dir = tempdir().expect("tempdir");
        log_flow(dir.path(), "handler `x` emitted nothing");
        let body = fs::read_to_string(flow_log_path(dir.path())).expect("read log");
        assert!(body.contains("handler `x` emitted nothing"));
        assert!(body.contains('T'), "expected an RFC 3339 timestamp: {body}");
    }
}
