//! Parsed request bodies and the re-serialization interceptor.
//!
//! Once the body parsing stage has consumed the caller's stream, the original
//! bytes are gone. For mutating methods the decoded body is therefore encoded
//! again and installed as the outgoing body, with a `Content-Type` naming the
//! encoding and an exact `Content-Length` that matches the new bytes.
use bytes::Bytes;
use http::{HeaderValue, Method, header};
use url::form_urlencoded;

use crate::core::{
    error::{BodyParseError, BodySerializationError},
    request::{IncomingRequest, OutgoingBody, OutgoingRequest},
};

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";

/// Body encodings understood by the parsing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

impl BodyEncoding {
    /// Pick the encoding from a `Content-Type` value, ignoring parameters.
    ///
    /// `application/json` and any `+json` structured suffix count as JSON.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == JSON_MEDIA_TYPE
            || (essence.starts_with("application/") && essence.ends_with("+json"))
        {
            Some(BodyEncoding::Json)
        } else if essence == FORM_MEDIA_TYPE {
            Some(BodyEncoding::Form)
        } else {
            None
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            BodyEncoding::Json => JSON_MEDIA_TYPE,
            BodyEncoding::Form => FORM_MEDIA_TYPE,
        }
    }
}

/// A request body after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(serde_json::Value),
    /// Ordered key/value pairs; repeated keys are kept.
    Form(Vec<(String, String)>),
}

impl ParsedBody {
    /// Decode raw bytes. Callers never pass an empty slice.
    pub fn decode(encoding: BodyEncoding, bytes: &[u8]) -> Result<Self, BodyParseError> {
        match encoding {
            BodyEncoding::Json => serde_json::from_slice(bytes)
                .map(ParsedBody::Json)
                .map_err(|e| BodyParseError::Malformed {
                    media_type: JSON_MEDIA_TYPE,
                    reason: e.to_string(),
                }),
            BodyEncoding::Form => Ok(ParsedBody::Form(
                form_urlencoded::parse(bytes).into_owned().collect(),
            )),
        }
    }

    pub fn encoding(&self) -> BodyEncoding {
        match self {
            ParsedBody::Json(_) => BodyEncoding::Json,
            ParsedBody::Form(_) => BodyEncoding::Form,
        }
    }

    /// Encode back to bytes in the body's own media type.
    pub fn encode(&self) -> Result<Bytes, BodySerializationError> {
        match self {
            ParsedBody::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| BodySerializationError {
                    media_type: JSON_MEDIA_TYPE,
                    reason: e.to_string(),
                }),
            ParsedBody::Form(pairs) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                Ok(Bytes::from(encoded))
            }
        }
    }
}

/// Methods whose body is re-serialized before forwarding.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Replace the outgoing body with a fresh encoding of the parsed body.
///
/// Applies only to mutating methods that carry a parsed body; every other
/// request is returned untouched.
pub fn reserialize_body(
    mut outgoing: OutgoingRequest,
    incoming: &IncomingRequest,
) -> Result<OutgoingRequest, BodySerializationError> {
    if !is_mutating(&incoming.method) {
        return Ok(outgoing);
    }
    let Some(parsed) = incoming.parsed_body.as_ref() else {
        return Ok(outgoing);
    };

    let bytes = parsed.encode()?;
    outgoing
        .headers
        .insert(header::CONTENT_TYPE, content_type_for(parsed, incoming));
    outgoing
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    outgoing.headers.remove(header::TRANSFER_ENCODING);
    outgoing.body = OutgoingBody::Full(bytes);

    tracing::debug!(
        service = %outgoing.service,
        media_type = parsed.encoding().media_type(),
        "Re-serialized request body"
    );
    Ok(outgoing)
}

/// The caller's `Content-Type` when it names the body's encoding, so media
/// types such as `application/merge-patch+json` and charset parameters reach
/// the upstream unchanged. Otherwise the encoding's canonical media type.
fn content_type_for(parsed: &ParsedBody, incoming: &IncomingRequest) -> HeaderValue {
    incoming
        .headers
        .get(header::CONTENT_TYPE)
        .filter(|value| {
            value
                .to_str()
                .ok()
                .and_then(BodyEncoding::from_content_type)
                == Some(parsed.encoding())
        })
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(parsed.encoding().media_type()))
}
