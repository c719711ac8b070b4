//! Error taxonomy of the gateway.
//!
//! [`ConfigurationError`] only ever surfaces at startup and stops the process
//! before it listens. [`GatewayError`] covers everything that can go wrong
//! while a single request is handled; each variant maps to one HTTP status so
//! the forwarding handler can answer the caller without crashing anything else.
use http::StatusCode;
use thiserror::Error;

use crate::{config::ValidationError, ports::http_client::HttpClientError};

/// Fatal problems found while building the registry and route table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("service '{service}' required by route '{route}' has no address")]
    MissingServiceAddress { service: String, route: String },

    #[error("service '{service}' has an unusable address '{address}': {reason}")]
    InvalidServiceAddress {
        service: String,
        address: String,
        reason: String,
    },

    #[error("route prefix '{prefix}' is registered more than once")]
    DuplicatePrefix { prefix: String },

    #[error("route prefix '{prefix}' is invalid: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The parsed body could not be turned back into bytes.
#[derive(Error, Debug)]
#[error("failed to encode request body as {media_type}: {reason}")]
pub struct BodySerializationError {
    pub media_type: &'static str,
    pub reason: String,
}

/// Failures of the body parsing stage in front of the forwarder.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BodyParseError {
    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("malformed {media_type} body: {reason}")]
    Malformed {
        media_type: &'static str,
        reason: String,
    },

    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Per-request failures, each surfaced to the caller as one status code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("no route matches path '{path}'")]
    RouteNotFound { path: String },

    #[error("upstream service '{service}' is unavailable: {source}")]
    UpstreamUnavailable {
        service: String,
        #[source]
        source: HttpClientError,
    },

    #[error(transparent)]
    BodySerialization(#[from] BodySerializationError),

    #[error(transparent)]
    BodyParse(#[from] BodyParseError),

    #[error("cannot build upstream uri '{uri}': {reason}")]
    InvalidUpstreamUri { uri: String, reason: String },
}

impl GatewayError {
    /// HTTP status the caller receives for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable { source, .. } => match source {
                HttpClientError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            GatewayError::BodySerialization(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyParse(BodyParseError::PayloadTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            GatewayError::BodyParse(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidUpstreamUri { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short machine-readable tag used in error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::UpstreamUnavailable { source, .. } => match source {
                HttpClientError::Timeout(_) => "upstream_timeout",
                _ => "upstream_unavailable",
            },
            GatewayError::BodySerialization(_) => "body_serialization",
            GatewayError::BodyParse(BodyParseError::PayloadTooLarge { .. }) => "payload_too_large",
            GatewayError::BodyParse(_) => "malformed_body",
            GatewayError::InvalidUpstreamUri { .. } => "invalid_upstream_uri",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        let not_found = GatewayError::RouteNotFound {
            path: "/api/v2/unknown".to_string(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let refused = GatewayError::UpstreamUnavailable {
            service: "USER".to_string(),
            source: HttpClientError::ConnectionError("connection refused".to_string()),
        };
        assert_eq!(refused.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(refused.kind(), "upstream_unavailable");

        let timed_out = GatewayError::UpstreamUnavailable {
            service: "USER".to_string(),
            source: HttpClientError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(timed_out.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let unencodable = GatewayError::from(BodySerializationError {
            media_type: "application/json",
            reason: "unsupported value".to_string(),
        });
        assert_eq!(unencodable.status_code(), StatusCode::BAD_REQUEST);

        let too_large = GatewayError::from(BodyParseError::PayloadTooLarge { limit: 8 });
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn upstream_error_mentions_service() {
        let err = GatewayError::UpstreamUnavailable {
            service: "SETTINGS".to_string(),
            source: HttpClientError::ConnectionError("refused".to_string()),
        };
        assert!(err.to_string().contains("SETTINGS"));
    }
}
