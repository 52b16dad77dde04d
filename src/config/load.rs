use super::{ConfigError, Settings, SETTINGS_FILE_NAME};
use std::path::{Path, PathBuf};

pub fn settings_path(state_root: &Path) -> PathBuf {
    state_root.join(SETTINGS_FILE_NAME)
}

/// Reads and validates `config.yaml` under the state root.
pub fn load_settings(state_root: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path(state_root);
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_settings_reads_and_validates() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            settings_path(dir.path()),
            "platform:\n  host: https://api.example.com\n",
        )
        .expect("write settings");

        let settings = load_settings(dir.path()).expect("load");
        assert_eq!(settings.platform.host, "https://api.example.com");
    }

    #[test]
    fn load_settings_surfaces_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_settings(dir.path()).expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_settings_rejects_invalid_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(settings_path(dir.path()), "platform:\n  host: nope\n").expect("write settings");
        let err = load_settings(dir.path()).expect_err("invalid host");
        assert!(matches!(err, ConfigError::Settings(_)));
    }
}
