use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tracing::Instrument;

use crate::{
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_upstream_span,
};

/// HTTP client adapter using Hyper with Rustls.
///
/// Requests go out as HTTP/1.1 over plain TCP or TLS depending on the target
/// scheme. The optional timeout bounds the wait for the response head only;
/// the response body is streamed back to the caller as it arrives. Dropping
/// the future returned by [`HttpClient::send_request`] aborts the exchange.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    request_timeout: Option<Duration>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new(request_timeout: Option<Duration>) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();
        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }
        tracing::debug!(roots = root_cert_store.len(), "Loaded native root certificates");

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!(timeout = ?request_timeout, "Created upstream HTTP client");
        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    fn host_header(req: &Request<AxumBody>) -> HttpClientResult<HeaderValue> {
        let host = req.uri().host().ok_or_else(|| {
            HttpClientError::InvalidRequest(format!("outgoing URI has no host: {}", req.uri()))
        })?;
        let value = match req.uri().port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        HeaderValue::from_str(&value).map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let host = Self::host_header(&req)?;
        if !req.headers().contains_key(header::HOST) {
            req.headers_mut().insert(header::HOST, host);
        }
        *req.version_mut() = Version::HTTP_11;

        let method = req.method().clone();
        let uri = req.uri().clone();
        let span = create_upstream_span(&uri.to_string(), method.as_str());
        tracing::debug!(parent: &span, "Outgoing request headers: {:?}", req.headers());

        let pending = self.client.request(req);
        let result = match self.request_timeout {
            Some(limit) => match timeout(limit, pending).instrument(span.clone()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(parent: &span, "Upstream {} {} timed out after {:?}", method, uri, limit);
                    return Err(HttpClientError::Timeout(limit));
                }
            },
            None => pending.instrument(span.clone()).await,
        };

        match result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the serving side.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                tracing::error!(parent: &span, "Upstream request {} {} failed: {}", method, uri, e);
                Err(HttpClientError::ConnectionError(format!(
                    "request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}
