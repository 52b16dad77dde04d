use super::StatusDefinition;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("status `{name}` is not defined by the template")]
    UnknownStatusName { name: String },
    #[error("status id `{id}` is not defined by the template")]
    UnknownStatusId { id: String },
}

/// Maps a status display name to its acceptable-value id. Case-sensitive,
/// first match wins.
pub fn status_display_to_id(
    name: &str,
    statuses: &[StatusDefinition],
) -> Result<String, StatusError> {
    statuses
        .iter()
        .find(|status| status.display_name == name)
        .map(|status| status.id.clone())
        .ok_or_else(|| StatusError::UnknownStatusName {
            name: name.to_string(),
        })
}

/// Maps an acceptable-value id back to its display name.
pub fn status_id_to_display(
    id: &str,
    statuses: &[StatusDefinition],
) -> Result<String, StatusError> {
    statuses
        .iter()
        .find(|status| status.id == id)
        .map(|status| status.display_name.clone())
        .ok_or_else(|| StatusError::UnknownStatusId { id: id.to_string() })
}
