use crate::graphql::ApiView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub mod error;
pub mod load;
pub mod save;

pub use error::ConfigError;
pub use load::load_settings;
pub use save::{save_settings, starter_settings};

pub const SETTINGS_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub platform: PlatformConfig,
    #[serde(default)]
    pub monitoring: Monitoring,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Base URL of the platform API; GraphQL lives at `<host>/graphql`.
    pub host: String,
    #[serde(default = "default_views")]
    pub views: Vec<ApiView>,
}

fn default_views() -> Vec<ApiView> {
    vec![ApiView::Public]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Monitoring {
    pub heartbeat_interval: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerConfig {
    ActionFilter(ActionFilterConfig),
    AnnotationFilter(AnnotationFilterConfig),
    SpaceCreate(SpaceCreateConfig),
    SpaceUpdate(SpaceUpdateConfig),
    PersonLookup(PersonLookupConfig),
    MessagePost(MessagePostConfig),
    Graphql(GraphqlPassthroughConfig),
}

impl HandlerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ActionFilter(_) => "action_filter",
            Self::AnnotationFilter(_) => "annotation_filter",
            Self::SpaceCreate(_) => "space_create",
            Self::SpaceUpdate(_) => "space_update",
            Self::PersonLookup(_) => "person_lookup",
            Self::MessagePost(_) => "message_post",
            Self::Graphql(_) => "graphql",
        }
    }

    /// Whether this handler talks to the platform API. The annotation
    /// router works purely on the inbound event and runs without a
    /// credential.
    pub fn needs_credential(&self) -> bool {
        !matches!(self, Self::AnnotationFilter(_))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActionFilterConfig {
    /// Ordered comma-separated rules; each rule is `pattern` or
    /// `pattern (lens)`, with `*` matching any substring.
    pub actions: String,
    #[serde(default)]
    pub referral_message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnotationFilterConfig {
    #[serde(default = "default_true")]
    pub multi_output: bool,
    /// Ordered comma-separated output labels; `message-nlp-all` folds the
    /// enabled NLP subtypes into one output.
    #[serde(default)]
    pub outputs: String,
    #[serde(default)]
    pub nlp: NlpFlags,
}

impl Default for AnnotationFilterConfig {
    fn default() -> Self {
        Self {
            multi_output: true,
            outputs: String::new(),
            nlp: NlpFlags::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NlpFlags {
    #[serde(default)]
    pub keywords: bool,
    #[serde(default)]
    pub entities: bool,
    #[serde(default)]
    pub doc_sentiment: bool,
    #[serde(default)]
    pub relations: bool,
    #[serde(default)]
    pub concepts: bool,
    #[serde(default)]
    pub dates: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpaceCreateConfig {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visibility: Option<SpaceVisibility>,
    /// Comma-separated member ids used when the event carries none.
    #[serde(default)]
    pub members: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceVisibility {
    Private,
    Public,
}

impl SpaceVisibility {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Public => "PUBLIC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpaceUpdateConfig {
    #[serde(default)]
    pub space_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersonLookupConfig {
    /// Comma-separated ids or emails; takes precedence over the event list.
    #[serde(default)]
    pub people: Option<String>,
    #[serde(default)]
    pub lookup_by: LookupKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    #[default]
    Id,
    Email,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessagePostConfig {
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GraphqlPassthroughConfig {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub operation_name: Option<String>,
    /// Overrides the platform-wide view flags for this handler only.
    #[serde(default)]
    pub views: Option<Vec<ApiView>>,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn handler(&self, handler_id: &str) -> Result<&HandlerConfig, ConfigError> {
        self.handlers
            .get(handler_id)
            .ok_or_else(|| ConfigError::MissingHandler {
                handler_id: handler_id.to_string(),
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.platform.host.trim();
        if host.is_empty() {
            return Err(ConfigError::Settings(
                "platform.host must be non-empty".to_string(),
            ));
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(ConfigError::Settings(format!(
                "platform.host must start with http:// or https://, got `{host}`"
            )));
        }
        if self.platform.views.is_empty() {
            return Err(ConfigError::Settings(
                "platform.views must list at least one view".to_string(),
            ));
        }

        for (handler_id, handler) in &self.handlers {
            validate_handler_id(handler_id)?;
            validate_handler(handler_id, handler)?;
        }
        Ok(())
    }
}

fn validate_handler_id(handler_id: &str) -> Result<(), ConfigError> {
    if handler_id.is_empty() {
        return Err(ConfigError::Settings(
            "handler ids must be non-empty".to_string(),
        ));
    }
    if handler_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(ConfigError::Settings(format!(
        "handler id `{handler_id}` must use only ASCII letters, digits, '-' or '_'"
    )))
}

fn validate_handler(handler_id: &str, handler: &HandlerConfig) -> Result<(), ConfigError> {
    match handler {
        HandlerConfig::ActionFilter(cfg) => {
            if split_csv(&cfg.actions).is_empty() {
                return Err(ConfigError::Settings(format!(
                    "handler `{handler_id}` needs at least one action rule"
                )));
            }
        }
        HandlerConfig::AnnotationFilter(cfg) => {
            if cfg.multi_output && split_csv(&cfg.outputs).is_empty() {
                return Err(ConfigError::Settings(format!(
                    "handler `{handler_id}` enables multi_output but lists no outputs"
                )));
            }
        }
        HandlerConfig::Graphql(cfg) => {
            if let Some(views) = &cfg.views {
                if views.is_empty() {
                    return Err(ConfigError::Settings(format!(
                        "handler `{handler_id}` overrides views with an empty list"
                    )));
                }
            }
        }
        HandlerConfig::SpaceCreate(_)
        | HandlerConfig::SpaceUpdate(_)
        | HandlerConfig::PersonLookup(_)
        | HandlerConfig::MessagePost(_) => {}
    }
    Ok(())
}

/// Splits a comma-separated list, trimming elements and dropping empties.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_settings(yaml: &str) -> Settings {
        serde_yaml::from_str(yaml).expect("parse settings")
    }

    #[test]
    fn settings_parse_with_handler_table() {
        let settings = minimal_settings(
            r#"
platform:
  host: https://api.example.com
  views: [public, beta]
monitoring:
  heartbeat_interval: 5
handlers:
  triage:
    kind: action_filter
    actions: "approve, reject (Rejection), escalate*"
  nlp:
    kind: annotation_filter
    outputs: "message-nlp-all, message-focus"
    nlp:
      entities: true
"#,
        );
        settings.validate().expect("valid settings");
        assert_eq!(settings.platform.views.len(), 2);
        assert_eq!(settings.monitoring.heartbeat_interval, Some(5));
        assert_eq!(settings.handlers.len(), 2);
        assert_eq!(
            settings.handler("triage").expect("handler").kind(),
            "action_filter"
        );
        assert!(matches!(
            settings.handler("missing"),
            Err(ConfigError::MissingHandler { .. })
        ));
    }

    #[test]
    fn host_must_look_like_a_url() {
        let settings = minimal_settings(
            r#"
platform:
  host: api.example.com
"#,
        );
        let err = settings.validate().expect_err("invalid host");
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn views_default_to_public() {
        let settings = minimal_settings(
            r#"
platform:
  host: https://api.example.com
"#,
        );
        assert_eq!(settings.platform.views, vec![ApiView::Public]);
    }

    #[test]
    fn action_filter_requires_rules() {
        let settings = minimal_settings(
            r#"
platform:
  host: https://api.example.com
handlers:
  empty:
    kind: action_filter
    actions: " ,  , "
"#,
        );
        let err = settings.validate().expect_err("no rules");
        assert!(err.to_string().contains("action rule"));
    }

    #[test]
    fn multi_output_filter_requires_outputs() {
        let settings = minimal_settings(
            r#"
platform:
  host: https://api.example.com
handlers:
  fanout:
    kind: annotation_filter
    multi_output: true
"#,
        );
        let err = settings.validate().expect_err("no outputs");
        assert!(err.to_string().contains("outputs"));
    }

    #[test]
    fn handler_ids_reject_path_characters() {
        let settings = minimal_settings(
            r#"
platform:
  host: https://api.example.com
handlers:
  "../evil":
    kind: message_post
"#,
        );
        let err = settings.validate().expect_err("bad id");
        assert!(err.to_string().contains("ASCII"));
    }

    #[test]
    fn csv_splitting_trims_and_drops_empties() {
        assert_eq!(split_csv(" a, b ,, c "), vec!["a", "b", "c"]);
        assert!(split_csv("  ").is_empty());
    }
}
