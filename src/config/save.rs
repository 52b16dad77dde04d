use super::{
    ConfigError, HandlerConfig, MessagePostConfig, Monitoring, PlatformConfig, Settings,
    SETTINGS_FILE_NAME,
};
use crate::graphql::ApiView;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Serializes settings to `config.yaml` under the state root, creating the
/// directory when needed.
pub fn save_settings(state_root: &Path, settings: &Settings) -> Result<(), ConfigError> {
    fs::create_dir_all(state_root).map_err(|source| ConfigError::CreateDir {
        path: state_root.display().to_string(),
        source,
    })?;
    let path = state_root.join(SETTINGS_FILE_NAME);
    let raw = serde_yaml::to_string(settings).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(&path, raw).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Settings written by `spaceflow init`: one message handler against a
/// placeholder host, enough to show the file's shape.
pub fn starter_settings() -> Settings {
    let mut handlers = BTreeMap::new();
    handlers.insert(
        "announce".to_string(),
        HandlerConfig::MessagePost(MessagePostConfig {
            space_id: Some("replace-with-space-id".to_string()),
            actor: Some("spaceflow".to_string()),
            color: Some("#11ABA5".to_string()),
            title: None,
            text: None,
        }),
    );
    Settings {
        platform: PlatformConfig {
            host: "https://api.example.com".to_string(),
            views: vec![ApiView::Public],
        },
        monitoring: Monitoring::default(),
        handlers,
    }
}
