use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Environment variable consulted before the drop file.
pub const ACCESS_TOKEN_ENV: &str = "SPACEFLOW_ACCESS_TOKEN";
pub const TOKEN_FILE_NAME: &str = "token.json";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to read token file {path}: {source}")]
    ReadToken {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse token file {path}: {source}")]
    ParseToken {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("token file {path} carries an empty accessToken")]
    EmptyToken { path: String },
}

/// Bearer credential minted by an external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub issued_at: Option<i64>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            access_token: secret.into(),
            issued_at: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.access_token
    }
}

/// Shared slot announcing token availability to handler threads.
///
/// Workers block on [`TokenGate::wait_for_token`] until the heartbeat
/// installs a credential; there is no polling loop on the waiting side.
#[derive(Debug, Default)]
pub struct TokenGate {
    slot: Mutex<Option<AccessToken>>,
    ready: Condvar,
}

impl TokenGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a token and wakes every waiter.
    pub fn install(&self, token: AccessToken) {
        let mut slot = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        *slot = Some(token);
        self.ready.notify_all();
    }

    /// Drops the held token; waiters stay blocked until the next install.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        *slot = None;
    }

    pub fn current(&self) -> Option<AccessToken> {
        self.slot
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn has_token(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .is_some()
    }

    /// Blocks until a token is available or the timeout elapses.
    pub fn wait_for_token(&self, timeout: Duration) -> Option<AccessToken> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        loop {
            if let Some(token) = slot.as_ref() {
                return Some(token.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, wait) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|err| err.into_inner());
            slot = guard;
            if wait.timed_out() && slot.is_none() {
                return None;
            }
        }
    }
}

pub fn token_path(state_root: &Path) -> PathBuf {
    state_root.join("runtime").join(TOKEN_FILE_NAME)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads the token file if present; absence is not an error.
pub fn read_token_file(state_root: &Path) -> Result<Option<AccessToken>, AuthError> {
    let path = token_path(state_root);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(AuthError::ReadToken {
                path: path.display().to_string(),
                source,
            })
        }
    };
    let token: AccessToken =
        serde_json::from_str(&raw).map_err(|source| AuthError::ParseToken {
            path: path.display().to_string(),
            source,
        })?;
    if token.access_token.trim().is_empty() {
        return Err(AuthError::EmptyToken {
            path: path.display().to_string(),
        });
    }
    Ok(Some(token))
}

/// Resolves the current credential: environment first, drop file second.
pub fn read_provider_token(state_root: &Path) -> Result<Option<AccessToken>, AuthError> {
    if let Some(secret) = non_empty_env(ACCESS_TOKEN_ENV) {
        return Ok(Some(AccessToken::new(secret)));
    }
    read_token_file(state_root)
}

/// Re-reads the provider credential and reconciles the gate with it.
///
/// Returns whether the gate holds a token afterwards. A vanished credential
/// clears the gate so stale bearers never reach the API.
pub fn refresh_gate(state_root: &Path, gate: &TokenGate) -> Result<bool, AuthError> {
    match read_provider_token(state_root)? {
        Some(token) => {
            if gate.current().as_ref() != Some(&token) {
                gate.install(token);
            }
            Ok(true)
        }
        None => {
            gate.clear();
            Ok(false)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialHealth {
    pub ok: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Doctor-facing summary of where the credential comes from, if anywhere.
pub fn credential_health(state_root: &Path) -> CredentialHealth {
    if non_empty_env(ACCESS_TOKEN_ENV).is_some() {
        return CredentialHealth {
            ok: true,
            source: Some("environment".to_string()),
            reason: None,
        };
    }
    match read_token_file(state_root) {
        Ok(Some(_)) => CredentialHealth {
            ok: true,
            source: Some("file".to_string()),
            reason: None,
        },
        Ok(None) => CredentialHealth {
            ok: false,
            source: None,
            reason: Some(format!(
                "no credential: set {ACCESS_TOKEN_ENV} or write runtime/{TOKEN_FILE_NAME}"
            )),
        },
        Err(err) => CredentialHealth {
            ok: false,
            source: Some("file".to_string()),
            reason: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn gate_wait_returns_installed_token() {
        let gate = Arc::new(TokenGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_for_token(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        gate.install(AccessToken::new("tok-1"));
        let token = waiter.join().expect("join").expect("token");
        assert_eq!(token.secret(), "tok-1");
    }

    #[test]
    fn gate_wait_times_out_when_empty() {
        let gate = TokenGate::new();
        assert!(gate.wait_for_token(Duration::from_millis(30)).is_none());
        assert!(!gate.has_token());
    }

    #[test]
    fn gate_returns_immediately_when_token_held() {
        let gate = TokenGate::new();
        gate.install(AccessToken::new("tok-2"));
        let token = gate
            .wait_for_token(Duration::from_millis(1))
            .expect("token");
        assert_eq!(token.secret(), "tok-2");
        gate.clear();
        assert!(gate.current().is_none());
    }

    #[test]
    fn token_file_absence_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_token_file(dir.path()).expect("read").is_none());
    }

    #[test]
    fn token_file_parses_camel_case_wire_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = dir.path().join("runtime");
        std::fs::create_dir_all(&runtime).expect("mkdir");
        std::fs::write(
            runtime.join(TOKEN_FILE_NAME),
            r#"{"accessToken":"tok-3","issuedAt":1700000000}"#,
        )
        .expect("write token");

        let token = read_token_file(dir.path()).expect("read").expect("token");
        assert_eq!(token.secret(), "tok-3");
        assert_eq!(token.issued_at, Some(1700000000));
    }

    #[test]
    fn token_file_rejects_blank_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = dir.path().join("runtime");
        std::fs::create_dir_all(&runtime).expect("mkdir");
        std::fs::write(runtime.join(TOKEN_FILE_NAME), r#"{"accessToken":"  "}"#)
            .expect("write token");

        let err = read_token_file(dir.path()).expect_err("blank secret");
        assert!(matches!(err, AuthError::EmptyToken { .. }));
    }
}
