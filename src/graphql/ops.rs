//! Typed operations over the transport shim. Each op pairs a fixed query
//! document with a variables object and decodes the interesting slice of
//! `data`; caller values never reach the document text.

use super::{GraphqlClient, GraphqlError, GraphqlRequest};
use crate::auth::AccessToken;
use crate::config::LookupKey;
use crate::template::{PropertyDefinition, PropertyValueId, StatusDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const TEMPLATE_QUERY: &str = r#"
query getTemplate($id: ID!) {
  spaceTemplate(id: $id) {
    id
    name
    spaceStatus {
      acceptableValues { id displayName }
    }
    properties {
      items {
        id
        type
        displayName
        ... on SpaceListProperty {
          acceptableValues { id displayName }
        }
      }
    }
  }
}
"#;

const SPACE_QUERY: &str = r#"
query getSpace($id: ID!) {
  space(id: $id) {
    id
    title
    visibility
    propertyValueIds { propertyId propertyValueId }
    statusValueId
    templateInfo {
      id
      name
      spaceStatus {
        acceptableValues { id displayName }
      }
      properties {
        items {
          id
          type
          displayName
          ... on SpaceListProperty {
            acceptableValues { id displayName }
          }
        }
      }
    }
  }
}
"#;

const CREATE_SPACE_MUTATION: &str = r#"
mutation createSpace($input: CreateSpaceInput!) {
  createSpace(input: $input) {
    space {
      id
      title
      visibility
      propertyValueIds { propertyId propertyValueId }
      statusValueId
    }
  }
}
"#;

const UPDATE_SPACE_MUTATION: &str = r#"
mutation updateSpace($input: UpdateSpaceInput!) {
  updateSpace(input: $input) {
    space {
      id
      title
      visibility
      propertyValueIds { propertyId propertyValueId }
      statusValueId
    }
  }
}
"#;

const ANNOTATIONS_QUERY: &str = r#"
query getAnnotations($id: ID!) {
  message(id: $id) {
    id
    annotations
  }
}
"#;

const PERSON_BY_ID_QUERY: &str = r#"
query getPersonById($id: ID!) {
  person(id: $id) {
    id
    displayName
    email
    photoUrl
    presence
    extId
    customerId
    created
    updated
  }
}
"#;

const PERSON_BY_EMAIL_QUERY: &str = r#"
query getPersonByEmail($email: String!) {
  person(email: $email) {
    id
    displayName
    email
    photoUrl
    presence
    extId
    customerId
    created
    updated
  }
}
"#;

const CREATE_MESSAGE_MUTATION: &str = r#"
mutation createMessage($input: CreateMessageInput!) {
  createMessage(input: $input) {
    message { id created }
  }
}
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub space_status: StatusSet,
    #[serde(default)]
    pub properties: PropertyPage,
}

impl SpaceTemplate {
    pub fn definitions(&self) -> &[PropertyDefinition] {
        &self.properties.items
    }

    pub fn statuses(&self) -> &[StatusDefinition] {
        &self.space_status.acceptable_values
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSet {
    #[serde(default)]
    pub acceptable_values: Vec<StatusDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyPage {
    #[serde(default)]
    pub items: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_value_ids: Vec<PropertyValueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_value_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceWithTemplate {
    #[serde(flatten)]
    pub space: SpaceSummary,
    #[serde(default)]
    pub template_info: Option<SpaceTemplate>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceInput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub property_values: Vec<PropertyValueId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_value_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpaceInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub property_values: Vec<PropertyValueId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_value_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_members: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// Application message content; rendered as a generic annotation.
#[derive(Debug, Clone, Default)]
pub struct AppMessage {
    pub actor: Option<String>,
    pub color: Option<String>,
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateEnvelope {
    #[serde(default)]
    space_template: Option<SpaceTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpaceEnvelope {
    #[serde(default)]
    space: Option<SpaceWithTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSpaceEnvelope {
    #[serde(default)]
    create_space: Option<SpacePayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSpaceEnvelope {
    #[serde(default)]
    update_space: Option<SpacePayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpacePayload {
    #[serde(default)]
    space: Option<SpaceSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageEnvelope {
    #[serde(default)]
    message: Option<MessageAnnotations>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MessageAnnotations {
    #[serde(default)]
    annotations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonEnvelope {
    #[serde(default)]
    person: Option<Person>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageEnvelope {
    #[serde(default)]
    create_message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    message: Option<MessageSummary>,
}

fn decode<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, GraphqlError> {
    serde_json::from_value(data).map_err(|e| GraphqlError::Decode(e.to_string()))
}

pub fn fetch_template(
    client: &GraphqlClient,
    token: &AccessToken,
    template_id: &str,
) -> Result<SpaceTemplate, GraphqlError> {
    let request = GraphqlRequest::new(TEMPLATE_QUERY)
        .with_operation_name("getTemplate")
        .with_variables(json!({ "id": template_id }));
    let data = client.execute(token, &request)?.into_data()?;
    decode::<TemplateEnvelope>(data)?
        .space_template
        .ok_or_else(|| GraphqlError::Api(format!("template `{template_id}` not found")))
}

pub fn fetch_space_with_template(
    client: &GraphqlClient,
    token: &AccessToken,
    space_id: &str,
) -> Result<SpaceWithTemplate, GraphqlError> {
    let request = GraphqlRequest::new(SPACE_QUERY)
        .with_operation_name("getSpace")
        .with_variables(json!({ "id": space_id }));
    let data = client.execute(token, &request)?.into_data()?;
    decode::<SpaceEnvelope>(data)?
        .space
        .ok_or_else(|| GraphqlError::Api(format!("space `{space_id}` not found")))
}

pub fn create_space(
    client: &GraphqlClient,
    token: &AccessToken,
    input: &CreateSpaceInput,
) -> Result<SpaceSummary, GraphqlError> {
    let request = GraphqlRequest::new(CREATE_SPACE_MUTATION)
        .with_operation_name("createSpace")
        .with_variables(json!({ "input": input }));
    let data = client.execute(token, &request)?.into_data()?;
    decode::<CreateSpaceEnvelope>(data)?
        .create_space
        .and_then(|payload| payload.space)
        .ok_or_else(|| GraphqlError::Api("space creation returned no space".to_string()))
}

pub fn update_space(
    client: &GraphqlClient,
    token: &AccessToken,
    input: &UpdateSpaceInput,
) -> Result<SpaceSummary, GraphqlError> {
    let request = GraphqlRequest::new(UPDATE_SPACE_MUTATION)
        .with_operation_name("updateSpace")
        .with_variables(json!({ "input": input }));
    let data = client.execute(token, &request)?.into_data()?;
    decode::<UpdateSpaceEnvelope>(data)?
        .update_space
        .and_then(|payload| payload.space)
        .ok_or_else(|| GraphqlError::Api("space update returned no space".to_string()))
}

/// Fetches a message's annotations; each element is a JSON-encoded string
/// decoded downstream on demand.
pub fn fetch_message_annotations(
    client: &GraphqlClient,
    token: &AccessToken,
    message_id: &str,
) -> Result<Vec<String>, GraphqlError> {
    let request = GraphqlRequest::new(ANNOTATIONS_QUERY)
        .with_operation_name("getAnnotations")
        .with_variables(json!({ "id": message_id }));
    let data = client.execute(token, &request)?.into_data()?;
    Ok(decode::<MessageEnvelope>(data)?
        .message
        .ok_or_else(|| GraphqlError::Api(format!("message `{message_id}` not found")))?
        .annotations)
}

fn person_request(lookup: LookupKey, needle: &str) -> GraphqlRequest {
    match lookup {
        LookupKey::Id => GraphqlRequest::new(PERSON_BY_ID_QUERY)
            .with_operation_name("getPersonById")
            .with_variables(json!({ "id": needle })),
        LookupKey::Email => GraphqlRequest::new(PERSON_BY_EMAIL_QUERY)
            .with_operation_name("getPersonByEmail")
            .with_variables(json!({ "email": needle })),
    }
}

pub fn fetch_person(
    client: &GraphqlClient,
    token: &AccessToken,
    lookup: LookupKey,
    needle: &str,
) -> Result<Person, GraphqlError> {
    let request = person_request(lookup, needle);
    let data = client.execute(token, &request)?.into_data()?;
    decode::<PersonEnvelope>(data)?
        .person
        .ok_or_else(|| GraphqlError::Api(format!("person `{needle}` not found")))
}

fn message_input(space_id: &str, message: &AppMessage) -> serde_json::Value {
    let mut annotation = json!({ "text": message.text });
    if let Some(actor) = message.actor.as_deref().filter(|v| !v.trim().is_empty()) {
        annotation["actor"] = json!({ "name": actor });
    }
    if let Some(color) = message.color.as_deref().filter(|v| !v.trim().is_empty()) {
        annotation["color"] = json!(color);
    }
    if let Some(title) = message.title.as_deref().filter(|v| !v.trim().is_empty()) {
        annotation["title"] = json!(title);
    }
    json!({
        "conversationId": space_id,
        "annotations": [{ "genericAnnotation": annotation }],
    })
}

pub fn create_message(
    client: &GraphqlClient,
    token: &AccessToken,
    space_id: &str,
    message: &AppMessage,
) -> Result<MessageSummary, GraphqlError> {
    let request = GraphqlRequest::new(CREATE_MESSAGE_MUTATION)
        .with_operation_name("createMessage")
        .with_variables(json!({ "input": message_input(space_id, message) }));
    let data = client.execute(token, &request)?.into_data()?;
    decode::<CreateMessageEnvelope>(data)?
        .create_message
        .and_then(|payload| payload.message)
        .ok_or_else(|| GraphqlError::Api("message creation returned no message".to_string()))
}
