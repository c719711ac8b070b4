//! Listener and router wiring.
//!
//! Startup is strictly ordered: the configuration is turned into a
//! [`GatewayService`] (which fails on any missing service address), validated,
//! and only then is the listen socket bound. A misconfigured gateway therefore
//! never accepts a connection.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{ConnectInfo, Request},
    middleware,
    routing::any,
};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{
        http_client::HttpClientAdapter,
        http_handler::HttpHandler,
        middleware::{request_id_middleware, request_timing_middleware},
    },
    config::{ServerConfig, ServerConfigValidator, ValidationError},
    core::{ConfigurationError, GatewayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};

/// A fully wired gateway that has not bound its socket yet.
pub struct GatewayServer {
    handler: HttpHandler,
    listen_addr: SocketAddr,
}

impl GatewayServer {
    /// Build the gateway from configuration using the given upstream client.
    pub fn build(
        config: &ServerConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigurationError> {
        let gateway = GatewayService::new(config)?;
        ServerConfigValidator::validate(config)?;

        let listen_addr = config.listen_addr.parse::<SocketAddr>().map_err(|e| {
            ValidationError::InvalidListenAddress {
                address: config.listen_addr.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            handler: HttpHandler::new(Arc::new(gateway), http_client),
            listen_addr,
        })
    }

    /// Build the gateway with the default hyper-based upstream client.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let http_client: Arc<dyn HttpClient> = Arc::new(
            HttpClientAdapter::new(config.upstream_timeout())
                .wrap_err("Failed to create HTTP client adapter")?,
        );
        Self::build(config, http_client).wrap_err("Invalid gateway configuration")
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn handler(&self) -> &HttpHandler {
        &self.handler
    }

    /// Router forwarding every path and method through the handler.
    pub fn router(&self) -> Router {
        build_router(self.handler.clone())
    }

    /// Bind the configured listen address.
    pub async fn bind(self) -> Result<BoundServer> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .wrap_err_with(|| format!("Failed to bind to {}", self.listen_addr))?;
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to read bound address")?;

        tracing::info!(%local_addr, "Gateway listening");
        Ok(BoundServer {
            listener,
            router: self.router(),
            local_addr,
        })
    }
}

/// A gateway whose socket is bound; call [`BoundServer::serve`] to accept connections.
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// Actual bound address, useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn serve(self, shutdown: GracefulShutdown) -> Result<()> {
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!(?reason, "Stopping gateway, draining in-flight requests");
        })
        .await
        .wrap_err("Server error")
    }
}

/// Attach the forwarding handler and the middleware stack.
pub fn build_router(handler: HttpHandler) -> Router {
    let make_request_route = |handler: HttpHandler| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                handler.handle_request(req, client_addr).await
            }
        })
    };

    Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_timing_middleware))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::config::RouteConfig;

    fn config() -> ServerConfig {
        ServerConfig::builder()
            .listen_addr("127.0.0.1:0")
            .service("USER", "http://127.0.0.1:9")
            .route(RouteConfig::strip("/api/v1/users", "USER"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_service_fails_build() {
        let mut config = config();
        config.services.clear();

        assert!(matches!(
            GatewayServer::from_config(&config)
                .err()
                .and_then(|e| e.downcast::<ConfigurationError>().ok()),
            Some(ConfigurationError::MissingServiceAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_timeout_fails_build() {
        let mut config = config();
        config.upstream_timeout = "whenever".to_string();

        assert!(matches!(
            GatewayServer::from_config(&config)
                .err()
                .and_then(|e| e.downcast::<ConfigurationError>().ok()),
            Some(ConfigurationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unrouted_path_is_404_with_request_id() {
        let server = GatewayServer::from_config(&config()).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "route_not_found");
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let bound = GatewayServer::from_config(&config())
            .unwrap()
            .bind()
            .await
            .unwrap();
        assert_ne!(bound.local_addr().port(), 0);
    }
}
