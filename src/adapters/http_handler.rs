use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    http::header,
};
use hyper::{Method, Request, Response};

use crate::{
    adapters::body_parser::parse_request,
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
};

/// Forwarding handler for every request the gateway receives.
///
/// Runs the pipeline parse body → resolve → rewrite → re-serialize →
/// dispatch, and converts any [`GatewayError`] into a JSON error response so
/// one failing request never affects another.
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            gateway_service,
            http_client,
        }
    }

    pub fn gateway_service(&self) -> &GatewayService {
        &self.gateway_service
    }

    /// Forward one caller request and return the upstream response or an error response.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // Unroutable requests are rejected before their body is read.
        let service = match self.gateway_service.resolve(&path) {
            Ok(route) => route.service_id().to_string(),
            Err(err) => return reject(&method, &path, None, err),
        };

        match self.forward(req, client_addr).await {
            Ok(response) => {
                tracing::info!(
                    %method,
                    %path,
                    %service,
                    status = response.status().as_u16(),
                    "Forwarded request"
                );
                response
            }
            Err(err) => reject(&method, &path, Some(&service), err),
        }
    }

    async fn forward(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let (incoming, body) =
            parse_request(req, client_addr, self.gateway_service.max_body_bytes()).await?;
        let outgoing = self.gateway_service.plan(&incoming, body)?;
        let service = outgoing.service.clone();
        let target = outgoing.uri.to_string();

        let upstream_request =
            outgoing
                .into_http()
                .map_err(|e| GatewayError::InvalidUpstreamUri {
                    uri: target,
                    reason: e.to_string(),
                })?;

        self.http_client
            .send_request(upstream_request)
            .await
            .map_err(|source| GatewayError::UpstreamUnavailable { service, source })
    }
}

/// Log a failed request and turn it into its error response.
fn reject(
    method: &Method,
    path: &str,
    service: Option<&str>,
    err: GatewayError,
) -> Response<AxumBody> {
    if err.status_code().is_server_error() {
        tracing::error!(%method, path, service, kind = err.kind(), "Forwarding failed: {}", err);
    } else {
        tracing::warn!(%method, path, service, kind = err.kind(), "Request rejected: {}", err);
    }
    error_response(&err)
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            gateway_service: self.gateway_service.clone(),
            http_client: self.http_client.clone(),
        }
    }
}

/// JSON error body: `{"error": <kind>, "message": <display>}`.
pub fn error_response(err: &GatewayError) -> Response<AxumBody> {
    let body = serde_json::json!({
        "error": err.kind(),
        "message": err.to_string(),
    });

    let mut response = Response::new(AxumBody::from(body.to_string()));
    *response.status_mut() = err.status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
