use serde::{Deserialize, Serialize};

pub mod client;
pub mod ops;
pub mod request;

pub use client::{GraphqlClient, GraphqlResponse};
pub use request::GraphqlRequest;

/// Schema surfaces the platform exposes behind the `x-graphql-view` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiView {
    Public,
    Beta,
    Experimental,
}

impl ApiView {
    pub fn as_header(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Beta => "BETA",
            Self::Experimental => "EXPERIMENTAL",
        }
    }
}

/// Joins view flags into the header value the platform expects.
pub fn view_header(views: &[ApiView]) -> String {
    views
        .iter()
        .map(|view| view.as_header())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum GraphqlError {
    /// Network failure or a non-2xx HTTP status.
    #[error("graphql request failed: {0}")]
    Transport(String),
    #[error("graphql response decode failed: {0}")]
    Decode(String),
    /// The platform answered but rejected the operation.
    #[error("platform rejected the operation: {0}")]
    Api(String),
    #[error("graphql response carried no data")]
    NoData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_header_joins_in_declaration_order() {
        assert_eq!(view_header(&[ApiView::Public]), "PUBLIC");
        assert_eq!(
            view_header(&[ApiView::Public, ApiView::Beta, ApiView::Experimental]),
            "PUBLIC, BETA, EXPERIMENTAL"
        );
    }

    #[test]
    fn views_parse_from_lowercase_config_names() {
        let views: Vec<ApiView> = serde_yaml::from_str("[public, beta]").expect("parse");
        assert_eq!(views, vec![ApiView::Public, ApiView::Beta]);
    }
}
