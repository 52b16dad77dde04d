use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub mod properties;
pub mod status;

pub use properties::{resolve_display_to_id, resolve_id_to_display, TranslationError};
pub use status::{status_display_to_id, status_id_to_display, StatusError};

/// Property type as declared by a space template.
///
/// The platform defines `LIST`, `BOOLEAN` and `TEXT`; anything else is
/// handled as free text, so decoding never fails on an unknown tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyKind {
    List,
    Boolean,
    #[default]
    Text,
}

impl PropertyKind {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::List => "LIST",
            Self::Boolean => "BOOLEAN",
            Self::Text => "TEXT",
        }
    }

    fn from_wire(raw: &str) -> Self {
        match raw {
            "LIST" => Self::List,
            "BOOLEAN" => Self::Boolean,
            _ => Self::Text,
        }
    }
}

impl Serialize for PropertyKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for PropertyKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptableValue {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: PropertyKind,
    pub display_name: String,
    #[serde(default)]
    pub acceptable_values: Vec<AcceptableValue>,
}

/// Display-form assignment, as authored by a person.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PropertyValue {
    pub name: String,
    pub value: String,
}

/// Id-form assignment, as stored by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValueId {
    pub property_id: String,
    pub property_value_id: String,
}

/// Fully translated assignment carrying both forms.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProperty {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub display_name: String,
    pub value_id: String,
    pub value_display_name: String,
}

impl ResolvedProperty {
    pub fn value_id_pair(&self) -> PropertyValueId {
        PropertyValueId {
            property_id: self.id.clone(),
            property_value_id: self.value_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDefinition {
    pub id: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_kind_decodes_known_and_unknown_tags() {
        let def: PropertyDefinition = serde_json::from_str(
            r#"{"id":"p1","type":"LIST","displayName":"Stage","acceptableValues":[{"id":"v1","displayName":"Open"}]}"#,
        )
        .expect("decode");
        assert_eq!(def.kind, PropertyKind::List);
        assert_eq!(def.acceptable_values.len(), 1);

        let def: PropertyDefinition =
            serde_json::from_str(r#"{"id":"p2","type":"RATING","displayName":"Score"}"#)
                .expect("decode");
        assert_eq!(def.kind, PropertyKind::Text);
        assert!(def.acceptable_values.is_empty());
    }

    #[test]
    fn property_kind_round_trips_through_wire_names() {
        for kind in [PropertyKind::List, PropertyKind::Boolean, PropertyKind::Text] {
            let encoded = serde_json::to_string(&kind).expect("encode");
            let decoded: PropertyKind = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, kind);
        }
    }

    #[test]
    fn resolved_property_projects_id_pair() {
        let resolved = ResolvedProperty {
            id: "p1".to_string(),
            kind: PropertyKind::List,
            display_name: "Stage".to_string(),
            value_id: "v1".to_string(),
            value_display_name: "Open".to_string(),
        };
        let pair = resolved.value_id_pair();
        assert_eq!(pair.property_id, "p1");
        assert_eq!(pair.property_value_id, "v1");
    }
}
