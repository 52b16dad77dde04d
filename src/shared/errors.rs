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
    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
