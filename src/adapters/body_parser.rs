//! Body parsing stage in front of the forwarder.
//!
//! Mutating requests (`POST`, `PUT`, `PATCH`) whose media type is JSON or
//! form data have their body read up to a fixed limit and decoded. Reading
//! consumes the stream, so the forwarder later substitutes the re-serialized
//! body. Every other body, including uploads of any other media type, keeps
//! its original stream and is forwarded as it arrives.
use std::net::SocketAddr;

use axum::body::Body as AxumBody;
use http::{Request, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::core::{
    body::{BodyEncoding, ParsedBody, is_mutating},
    error::BodyParseError,
    request::{IncomingRequest, OutgoingBody},
};

/// Split a caller request into its parsed form and what is left of its body.
pub async fn parse_request(
    req: Request<AxumBody>,
    client_addr: Option<SocketAddr>,
    limit: usize,
) -> Result<(IncomingRequest, OutgoingBody), BodyParseError> {
    let (parts, body) = req.into_parts();
    let mut incoming = IncomingRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        parsed_body: None,
        client_addr,
    };

    if !is_mutating(&incoming.method) {
        return Ok((incoming, OutgoingBody::Stream(body)));
    }

    let encoding = incoming
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(BodyEncoding::from_content_type);
    let Some(encoding) = encoding else {
        return Ok((incoming, OutgoingBody::Stream(body)));
    };

    let declared = incoming
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(BodyParseError::PayloadTooLarge { limit });
    }

    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                BodyParseError::PayloadTooLarge { limit }
            } else {
                BodyParseError::Read(e.to_string())
            }
        })?
        .to_bytes();

    if bytes.is_empty() {
        return Ok((incoming, OutgoingBody::Empty));
    }

    incoming.parsed_body = Some(ParsedBody::decode(encoding, &bytes)?);
    tracing::debug!(
        media_type = encoding.media_type(),
        bytes = bytes.len(),
        "Parsed request body"
    );
    Ok((incoming, OutgoingBody::Empty))
}
