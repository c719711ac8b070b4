//! Core gateway orchestration service.
//!
//! `GatewayService` owns the immutable service registry and route table built
//! from [`ServerConfig`] at startup. Turning a caller request into an upstream
//! request is pure: resolve the route, rewrite the path, copy headers, then
//! run the body interceptor. No I/O happens here so every step is testable in
//! isolation; dispatch belongs to the HTTP client port.
use std::{sync::Arc, time::Duration};

use http::Uri;

use crate::{
    config::ServerConfig,
    core::{
        body::reserialize_body,
        error::{ConfigurationError, GatewayError},
        registry::ServiceRegistry,
        request::{IncomingRequest, OutgoingBody, OutgoingRequest, forward_headers},
        routes::{Route, RouteTable},
    },
};

/// Central orchestrator for route resolution and request planning.
///
/// Construct with [`GatewayService::new`]; the result is shared read-only
/// across all in-flight requests.
#[derive(Debug)]
pub struct GatewayService {
    registry: Arc<ServiceRegistry>,
    routes: RouteTable,
    upstream_timeout: Option<Duration>,
    max_body_bytes: usize,
}

impl GatewayService {
    /// Build the registry and bind every route to its service.
    ///
    /// Fails when a route names a service without a usable address, so a
    /// misconfigured gateway never starts listening.
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigurationError> {
        let registry = Arc::new(ServiceRegistry::from_config(config)?);
        let routes = RouteTable::build(&config.routes, &registry)?;

        tracing::info!(
            services = registry.len(),
            routes = routes.len(),
            "Gateway routing initialised"
        );

        Ok(Self {
            registry,
            routes,
            upstream_timeout: config.upstream_timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Maximum time to wait for an upstream response head.
    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout
    }

    /// Largest JSON or form body the parsing stage buffers.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Longest‑prefix match for an incoming path.
    pub fn resolve(&self, path: &str) -> Result<&Route, GatewayError> {
        self.routes
            .resolve(path)
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: path.to_string(),
            })
    }

    /// Build the upstream request for `incoming`.
    ///
    /// `body` is what the parsing stage left of the caller's body: the
    /// untouched stream for non-mutating methods and for media types it does
    /// not decode, or nothing. For mutating methods with a parsed body it is
    /// replaced by the re-serialized bytes.
    pub fn plan(
        &self,
        incoming: &IncomingRequest,
        body: OutgoingBody,
    ) -> Result<OutgoingRequest, GatewayError> {
        let route = self.resolve(incoming.path())?;
        let target = route.upstream_target(incoming.path(), incoming.query());
        let uri = target
            .parse::<Uri>()
            .map_err(|e| GatewayError::InvalidUpstreamUri {
                uri: target.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            prefix = route.prefix(),
            service = route.service_id(),
            target = %uri,
            "Resolved upstream target"
        );

        let outgoing = OutgoingRequest {
            method: incoming.method.clone(),
            uri,
            headers: forward_headers(incoming, route.endpoint()),
            body,
            service: route.service_id().to_string(),
        };

        Ok(reserialize_body(outgoing, incoming)?)
    }
}
