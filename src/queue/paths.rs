use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub incoming: PathBuf,
    pub processing: PathBuf,
    pub outgoing: PathBuf,
    pub errors: PathBuf,
}

impl QueuePaths {
    pub fn from_state_root(state_root: &Path) -> Self {
        Self {
            incoming: state_root.join("queue/incoming"),
            processing: state_root.join("queue/processing"),
            outgoing: state_root.join("queue/outgoing"),
            errors: state_root.join("queue/errors"),
        }
    }
}

/// Outgoing files carry the slot so one event's sparse outputs stay distinct.
pub fn outgoing_filename(handler: &str, event_id: &str, slot: usize) -> String {
    format!(
        "{}_{}_s{}.json",
        sanitize_filename_component(handler),
        sanitize_filename_component(event_id),
        slot
    )
}

pub fn error_filename(handler: &str, event_id: &str) -> String {
    format!(
        "{}_{}_error.json",
        sanitize_filename_component(handler),
        sanitize_filename_component(event_id)
    )
}

pub fn is_valid_queue_json_filename(filename: &str) -> bool {
    let path = Path::new(filename);
    if path.extension().and_then(|v| v.to_str()) != Some("json") {
        return false;
    }

    if let Some(stem) = path.file_stem().and_then(|v| v.to_str()) {
        return !stem.trim().is_empty();
    }

    false
}

fn sanitize_filename_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_sanitize_hostile_components() {
        assert_eq!(
            outgoing_filename("triage", "evt/../1", 0),
            "triage_evt_.._1_s0.json"
        );
        assert_eq!(error_filename("a b", "e1"), "a_b_e1_error.json");
    }

    #[test]
    fn queue_filename_validation_requires_json_with_stem() {
        assert!(is_valid_queue_json_filename("event.json"));
        assert!(!is_valid_queue_json_filename("event.txt"));
        assert!(!is_valid_queue_json_filename(".json"));
        assert!(!is_valid_queue_json_filename(" .json"));
    }
}
