use super::{PropertyDefinition, PropertyKind, PropertyValue, PropertyValueId, ResolvedProperty};

/// Rejection of one assignment; the whole batch fails with it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("property `{name}` at position {index} is not defined by the template")]
    UnknownProperty { index: usize, name: String },
    #[error("property id `{property_id}` at position {index} is not defined by the template")]
    UnknownPropertyId { index: usize, property_id: String },
    #[error("value `{value}` at position {index} is not acceptable for list property `{name}`")]
    UnknownListValue {
        index: usize,
        name: String,
        value: String,
    },
    #[error("value `{value}` at position {index} is not a boolean for property `{name}`")]
    InvalidBoolean {
        index: usize,
        name: String,
        value: String,
    },
}

impl TranslationError {
    /// Zero-based position of the assignment that failed.
    pub fn index(&self) -> usize {
        match self {
            Self::UnknownProperty { index, .. }
            | Self::UnknownPropertyId { index, .. }
            | Self::UnknownListValue { index, .. }
            | Self::InvalidBoolean { index, .. } => *index,
        }
    }
}

/// Translates display-form assignments into id form against the template's
/// definitions. Stops at the first failure and returns it; no partial batch
/// is ever produced.
pub fn resolve_display_to_id(
    values: &[PropertyValue],
    defs: &[PropertyDefinition],
) -> Result<Vec<ResolvedProperty>, TranslationError> {
    let mut resolved = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let def = defs
            .iter()
            .find(|def| def.display_name == value.name)
            .ok_or_else(|| TranslationError::UnknownProperty {
                index,
                name: value.name.clone(),
            })?;
        resolved.push(resolve_display_value(index, def, value)?);
    }
    Ok(resolved)
}

fn resolve_display_value(
    index: usize,
    def: &PropertyDefinition,
    value: &PropertyValue,
) -> Result<ResolvedProperty, TranslationError> {
    let (value_id, value_display_name) = match def.kind {
        PropertyKind::List => {
            let entry = def
                .acceptable_values
                .iter()
                .find(|entry| entry.display_name == value.value)
                .ok_or_else(|| TranslationError::UnknownListValue {
                    index,
                    name: value.name.clone(),
                    value: value.value.clone(),
                })?;
            (entry.id.clone(), entry.display_name.clone())
        }
        PropertyKind::Boolean => {
            let flag = parse_boolean(&value.value).ok_or_else(|| {
                TranslationError::InvalidBoolean {
                    index,
                    name: value.name.clone(),
                    value: value.value.clone(),
                }
            })?;
            boolean_forms(flag)
        }
        PropertyKind::Text => (value.value.clone(), value.value.clone()),
    };
    Ok(ResolvedProperty {
        id: def.id.clone(),
        kind: def.kind,
        display_name: def.display_name.clone(),
        value_id,
        value_display_name,
    })
}

/// Translates id-form assignments back into display form; the mirror of
/// [`resolve_display_to_id`], with the same fail-fast contract.
pub fn resolve_id_to_display(
    values: &[PropertyValueId],
    defs: &[PropertyDefinition],
) -> Result<Vec<ResolvedProperty>, TranslationError> {
    let mut resolved = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let def = defs
            .iter()
            .find(|def| def.id == value.property_id)
            .ok_or_else(|| TranslationError::UnknownPropertyId {
                index,
                property_id: value.property_id.clone(),
            })?;
        resolved.push(resolve_id_value(index, def, value)?);
    }
    Ok(resolved)
}

fn resolve_id_value(
    index: usize,
    def: &PropertyDefinition,
    value: &PropertyValueId,
) -> Result<ResolvedProperty, TranslationError> {
    let (value_id, value_display_name) = match def.kind {
        PropertyKind::List => {
            let entry = def
                .acceptable_values
                .iter()
                .find(|entry| entry.id == value.property_value_id)
                .ok_or_else(|| TranslationError::UnknownListValue {
                    index,
                    name: def.display_name.clone(),
                    value: value.property_value_id.clone(),
                })?;
            (entry.id.clone(), entry.display_name.clone())
        }
        PropertyKind::Boolean => {
            let flag = parse_boolean(&value.property_value_id).ok_or_else(|| {
                TranslationError::InvalidBoolean {
                    index,
                    name: def.display_name.clone(),
                    value: value.property_value_id.clone(),
                }
            })?;
            boolean_forms(flag)
        }
        PropertyKind::Text => (
            value.property_value_id.clone(),
            value.property_value_id.clone(),
        ),
    };
    Ok(ResolvedProperty {
        id: def.id.clone(),
        kind: def.kind,
        display_name: def.display_name.clone(),
        value_id,
        value_display_name,
    })
}

/// Projects translated assignments into the id pairs a mutation input wants.
pub fn value_id_pairs(resolved: &[ResolvedProperty]) -> Vec<PropertyValueId> {
    resolved.iter().map(ResolvedProperty::value_id_pair).collect()
}

fn parse_boolean(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Canonical boolean forms: the id is the platform's uppercase literal, the
/// display form is lowercase.
fn boolean_forms(flag: bool) -> (String, String) {
    if flag {
        ("TRUE".to_string(), "true".to_string())
    } else {
        ("FALSE".to_string(), "false".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::AcceptableValue;

    fn defs() -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition {
                id: "prop-stage".to_string(),
                kind: PropertyKind::List,
                display_name: "Stage".to_string(),
                acceptable_values: vec![
                    AcceptableValue {
                        id: "stage-open".to_string(),
                        display_name: "Open".to_string(),
                    },
                    AcceptableValue {
                        id: "stage-done".to_string(),
                        display_name: "Done".to_string(),
                    },
                ],
            },
            PropertyDefinition {
                id: "prop-urgent".to_string(),
                kind: PropertyKind::Boolean,
                display_name: "Urgent".to_string(),
                acceptable_values: Vec::new(),
            },
            PropertyDefinition {
                id: "prop-owner".to_string(),
                kind: PropertyKind::Text,
                display_name: "Owner".to_string(),
                acceptable_values: Vec::new(),
            },
        ]
    }

    fn display(name: &str, value: &str) -> PropertyValue {
        PropertyValue {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn text_batch_passes_values_through() {
        let values = vec![display("Owner", "casey"), display("Owner", "riley")];
        let resolved = resolve_display_to_id(&values, &defs()).expect("resolve");
        assert_eq!(resolved.len(), values.len());
        for (input, output) in values.iter().zip(&resolved) {
            assert_eq!(output.value_id, input.value);
            assert_eq!(output.value_display_name, input.value);
        }
    }

    #[test]
    fn list_value_binds_acceptable_value_id() {
        let resolved =
            resolve_display_to_id(&[display("Stage", "Done")], &defs()).expect("resolve");
        assert_eq!(resolved[0].id, "prop-stage");
        assert_eq!(resolved[0].value_id, "stage-done");
        assert_eq!(resolved[0].value_display_name, "Done");
    }

    #[test]
    fn boolean_accepts_any_case_and_canonicalizes() {
        for raw in ["true", "TRUE", "True"] {
            let resolved =
                resolve_display_to_id(&[display("Urgent", raw)], &defs()).expect("resolve");
            assert_eq!(resolved[0].value_id, "TRUE");
            assert_eq!(resolved[0].value_display_name, "true");
        }
        let resolved =
            resolve_display_to_id(&[display("Urgent", "False")], &defs()).expect("resolve");
        assert_eq!(resolved[0].value_id, "FALSE");
        assert_eq!(resolved[0].value_display_name, "false");
    }

    #[test]
    fn first_failure_rejects_whole_batch_with_position() {
        let values = vec![
            display("Owner", "casey"),
            display("Urgent", "maybe"),
            display("Stage", "Nope"),
        ];
        let err = resolve_display_to_id(&values, &defs()).expect_err("invalid boolean first");
        assert_eq!(err.index(), 1);
        assert_eq!(
            err,
            TranslationError::InvalidBoolean {
                index: 1,
                name: "Urgent".to_string(),
                value: "maybe".to_string(),
            }
        );
    }

    #[test]
    fn unknown_property_name_carries_the_name() {
        let err = resolve_display_to_id(&[display("Unknown", "x")], &defs())
            .expect_err("unknown property");
        assert_eq!(
            err,
            TranslationError::UnknownProperty {
                index: 0,
                name: "Unknown".to_string(),
            }
        );
    }

    #[test]
    fn unknown_list_value_carries_pair() {
        let err =
            resolve_display_to_id(&[display("Stage", "Missing")], &defs()).expect_err("bad value");
        assert_eq!(
            err,
            TranslationError::UnknownListValue {
                index: 0,
                name: "Stage".to_string(),
                value: "Missing".to_string(),
            }
        );
    }

    #[test]
    fn id_form_translates_back_to_display() {
        let values = vec![
            PropertyValueId {
                property_id: "prop-stage".to_string(),
                property_value_id: "stage-open".to_string(),
            },
            PropertyValueId {
                property_id: "prop-urgent".to_string(),
                property_value_id: "TRUE".to_string(),
            },
            PropertyValueId {
                property_id: "prop-owner".to_string(),
                property_value_id: "casey".to_string(),
            },
        ];
        let resolved = resolve_id_to_display(&values, &defs()).expect("resolve");
        assert_eq!(resolved[0].value_display_name, "Open");
        assert_eq!(resolved[1].value_display_name, "true");
        assert_eq!(resolved[2].value_display_name, "casey");
    }

    #[test]
    fn id_form_boolean_accepts_any_case() {
        let values = vec![PropertyValueId {
            property_id: "prop-urgent".to_string(),
            property_value_id: "false".to_string(),
        }];
        let resolved = resolve_id_to_display(&values, &defs()).expect("resolve");
        assert_eq!(resolved[0].value_id, "FALSE");
        assert_eq!(resolved[0].value_display_name, "false");
    }

    #[test]
    fn unknown_property_id_fails() {
        let values = vec![PropertyValueId {
            property_id: "prop-nope".to_string(),
            property_value_id: "x".to_string(),
        }];
        let err = resolve_id_to_display(&values, &defs()).expect_err("unknown id");
        assert_eq!(
            err,
            TranslationError::UnknownPropertyId {
                index: 0,
                property_id: "prop-nope".to_string(),
            }
        );
    }

    #[test]
    fn display_to_id_round_trips_for_list_and_text() {
        let values = vec![display("Stage", "Open"), display("Owner", "casey")];
        let forward = resolve_display_to_id(&values, &defs()).expect("forward");
        let pairs = value_id_pairs(&forward);
        let back = resolve_id_to_display(&pairs, &defs()).expect("back");
        for (input, output) in values.iter().zip(&back) {
            assert_eq!(output.display_name, input.name);
            assert_eq!(output.value_display_name, input.value);
        }
    }
}
