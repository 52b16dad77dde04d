use super::StatePaths;
use serde::Serialize;
use std::fs;
use std::io::Write;

/// One JSON line of `logs/runtime.log`. `request` ties a line to a single
/// handler invocation; runtime-lifecycle lines carry none.
#[derive(Debug, Serialize)]
struct RuntimeLogLine<'a> {
    timestamp: i64,
    level: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a str>,
    message: &'a str,
}

pub fn append_runtime_log(paths: &StatePaths, level: &str, event: &str, message: &str) {
    append_line(
        paths,
        RuntimeLogLine {
            timestamp: super::now_secs(),
            level,
            event,
            request: None,
            message,
        },
    );
}

/// Log line correlated to one handler invocation via its request id.
pub fn append_invocation_log(
    paths: &StatePaths,
    level: &str,
    event: &str,
    request_id: &str,
    message: &str,
) {
    append_line(
        paths,
        RuntimeLogLine {
            timestamp: super::now_secs(),
            level,
            event,
            request: Some(request_id),
            message,
        },
    );
}

/// Best effort: a log write must never fail the work it describes.
fn append_line(paths: &StatePaths, line: RuntimeLogLine<'_>) {
    let Ok(encoded) = serde_json::to_string(&line) else {
        return;
    };
    let path = paths.runtime_log_path();
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{encoded}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runtime_lines_are_json_without_a_request_field() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        append_runtime_log(&paths, "info", "runtime.started", "pid=1 handlers=0");

        let body = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
        let line: serde_json::Value = serde_json::from_str(body.trim()).expect("json line");
        assert_eq!(line["level"], "info");
        assert_eq!(line["event"], "runtime.started");
        assert_eq!(line["message"], "pid=1 handlers=0");
        assert!(line.get("request").is_none());
    }

    #[test]
    fn invocation_lines_carry_the_request_id() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        append_invocation_log(
            &paths,
            "error",
            "queue.failed",
            "req-1a-0000",
            "handler=triage event=evt-1: boom",
        );

        let body = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
        let line: serde_json::Value = serde_json::from_str(body.trim()).expect("json line");
        assert_eq!(line["request"], "req-1a-0000");
        assert_eq!(line["event"], "queue.failed");
    }

    #[test]
    fn lines_append_in_order() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        append_runtime_log(&paths, "info", "runtime.started", "first");
        append_invocation_log(&paths, "info", "queue.processed", "req-x", "second");

        let body = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
        let events: Vec<String> = body
            .lines()
            .map(|raw| {
                let line: serde_json::Value = serde_json::from_str(raw).expect("json line");
                line["event"].as_str().expect("event").to_string()
            })
            .collect();
        assert_eq!(events, vec!["runtime.started", "queue.processed"]);
    }
}
