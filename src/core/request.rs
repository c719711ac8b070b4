//! Request values flowing through the forwarding pipeline.
//!
//! [`IncomingRequest`] is what the body parsing stage hands over: the caller's
//! method, URI and headers plus the decoded body, if any. [`OutgoingRequest`]
//! is what gets dispatched upstream. Both live for a single request.
use std::net::SocketAddr;

use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version, header};

use crate::core::{body::ParsedBody, registry::ServiceEndpoint};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// A caller request after the body parsing stage.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Decoded body; present only for mutating methods with a non-empty, decodable body.
    pub parsed_body: Option<ParsedBody>,
    pub client_addr: Option<SocketAddr>,
}

impl IncomingRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            parsed_body: None,
            client_addr: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_parsed_body(mut self, body: ParsedBody) -> Self {
        self.parsed_body = Some(body);
        self
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
}

/// Body sent upstream.
#[derive(Debug, Default)]
pub enum OutgoingBody {
    /// Nothing to send; the caller sent nothing or the stream was already drained.
    #[default]
    Empty,
    /// Exact bytes of a re-serialized body.
    Full(Bytes),
    /// The caller's stream, forwarded as it arrives.
    Stream(AxumBody),
}

impl OutgoingBody {
    /// Bytes of a fully known body, `None` for streams.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OutgoingBody::Empty => Some(&[][..]),
            OutgoingBody::Full(bytes) => Some(bytes.as_ref()),
            OutgoingBody::Stream(_) => None,
        }
    }
}

impl From<OutgoingBody> for AxumBody {
    fn from(body: OutgoingBody) -> Self {
        match body {
            OutgoingBody::Empty => AxumBody::empty(),
            OutgoingBody::Full(bytes) => AxumBody::from(bytes),
            OutgoingBody::Stream(stream) => stream,
        }
    }
}

/// A request ready to be dispatched to an upstream service.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: OutgoingBody,
    /// Service the request is addressed to, for logs and errors.
    pub service: String,
}

impl OutgoingRequest {
    /// Convert into an HTTP/1.1 request for the client port.
    pub fn into_http(self) -> Result<Request<AxumBody>, http::Error> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .version(Version::HTTP_11);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        builder.body(self.body.into())
    }
}

/// Copy caller headers for the upstream request.
///
/// Hop‑by‑hop headers (and any named by `Connection`) are dropped, `Host`
/// becomes the upstream authority, and the `X-Forwarded-*` family records the
/// original caller.
pub fn forward_headers(incoming: &IncomingRequest, endpoint: &ServiceEndpoint) -> HeaderMap {
    let source = &incoming.headers;
    let connection_listed = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();

    let mut headers = HeaderMap::with_capacity(source.len() + 4);
    for (name, value) in source {
        let lower = name.as_str();
        if name == header::HOST
            || HOP_BY_HOP_HEADERS.contains(&lower)
            || connection_listed.iter().any(|listed| listed == lower)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(host) = HeaderValue::from_str(&endpoint.authority()) {
        headers.insert(header::HOST, host);
    }

    if let Some(addr) = incoming.client_addr {
        let client_ip = addr.ip().to_string();
        let forwarded_for = match source
            .get(&X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
        {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(&X_FORWARDED_HOST) {
        let original_host = source
            .get(header::HOST)
            .cloned()
            .or_else(|| {
                incoming
                    .uri
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            });
        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }

    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }

    headers
}
