use super::{view_header, ApiView, GraphqlError, GraphqlRequest};
use crate::auth::AccessToken;
use serde::Deserialize;

pub const VIEW_HEADER_NAME: &str = "x-graphql-view";
/// Test override for the platform host.
pub const HOST_ENV: &str = "SPACEFLOW_GRAPHQL_HOST";

/// Blocking transport for the platform's single GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    view_header: String,
}

/// Wire envelope: `errors` may be populated even when `data` is present,
/// so callers check both (or use [`GraphqlResponse::into_data`]).
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEntry {
    #[serde(default)]
    pub message: String,
}

impl GraphqlResponse {
    /// Folds a populated `errors` array into `GraphqlError::Api`; every
    /// handler here treats platform-level errors as terminal.
    pub fn into_data(self) -> Result<serde_json::Value, GraphqlError> {
        if !self.errors.is_empty() {
            return Err(GraphqlError::Api(fold_error_messages(&self.errors)));
        }
        self.data.ok_or(GraphqlError::NoData)
    }
}

fn fold_error_messages(errors: &[ApiErrorEntry]) -> String {
    let joined = errors
        .iter()
        .map(|entry| entry.message.trim())
        .filter(|message| !message.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        "unspecified platform error".to_string()
    } else {
        joined
    }
}

impl GraphqlClient {
    pub fn new(host: &str, views: &[ApiView]) -> Self {
        let host = std::env::var(HOST_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| host.to_string());
        Self {
            endpoint: format!("{}/graphql", host.trim_end_matches('/')),
            view_header: view_header(views),
        }
    }

    /// Same endpoint, different view flags; handlers with a view override
    /// clone the client through this.
    pub fn with_views(&self, views: &[ApiView]) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            view_header: view_header(views),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn execute(
        &self,
        token: &AccessToken,
        request: &GraphqlRequest,
    ) -> Result<GraphqlResponse, GraphqlError> {
        let body =
            serde_json::to_value(request).map_err(|e| GraphqlError::Transport(e.to_string()))?;
        let response = ureq::post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", token.secret()))
            .set(VIEW_HEADER_NAME, &self.view_header)
            .send_json(body)
            .map_err(|e| GraphqlError::Transport(e.to_string()))?;

        response
            .into_json::<GraphqlResponse>()
            .map_err(|e| GraphqlError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_host_and_graphql_path() {
        let client = GraphqlClient::new("https://api.example.com/", &[ApiView::Public]);
        assert!(client.endpoint().ends_with("/graphql"));
        assert!(!client.endpoint().contains("//graphql"));
    }

    #[test]
    fn into_data_returns_payload_without_errors() {
        let response: GraphqlResponse =
            serde_json::from_str(r#"{"data":{"space":{"id":"s1"}}}"#).expect("decode");
        let data = response.into_data().expect("data");
        assert_eq!(data["space"]["id"], "s1");
    }

    #[test]
    fn into_data_folds_error_entries() {
        let response: GraphqlResponse = serde_json::from_str(
            r#"{"data":{"space":null},"errors":[{"message":"forbidden"},{"message":"bad cursor"}]}"#,
        )
        .expect("decode");
        let err = response.into_data().expect_err("api error");
        match err {
            GraphqlError::Api(message) => {
                assert!(message.contains("forbidden"));
                assert!(message.contains("bad cursor"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn into_data_reports_blank_error_entries() {
        let response: GraphqlResponse =
            serde_json::from_str(r#"{"errors":[{"message":"  "}]}"#).expect("decode");
        let err = response.into_data().expect_err("api error");
        assert!(matches!(err, GraphqlError::Api(message) if message.contains("unspecified")));
    }

    #[test]
    fn into_data_without_data_or_errors_is_no_data() {
        let response: GraphqlResponse = serde_json::from_str("{}").expect("decode");
        assert!(matches!(
            response.into_data(),
            Err(GraphqlError::NoData)
        ));
    }

    #[test]
    fn view_override_keeps_endpoint() {
        let client = GraphqlClient::new("https://api.example.com", &[ApiView::Public]);
        let experimental = client.with_views(&[ApiView::Experimental]);
        assert_eq!(client.endpoint(), experimental.endpoint());
    }
}
