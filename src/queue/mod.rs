pub mod lifecycle;
pub mod message;
pub mod paths;

pub use lifecycle::{claim_oldest, complete_failure, complete_success, ClaimedEvent};
pub use message::{ErrorReport, InboundEvent, OutboundEvent};
pub use paths::{error_filename, is_valid_queue_json_filename, outgoing_filename, QueuePaths};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid queue payload in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
