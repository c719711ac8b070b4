//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that minimal configs remain concise.
//! The builder here is part of the public API for embedding and tests.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Suffix of the environment variable that supplies a service's base address,
/// e.g. `USER_SERVICE_URL` for service `USER`.
pub const SERVICE_URL_ENV_SUFFIX: &str = "_SERVICE_URL";

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream_timeout() -> String {
    "30s".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// How the matched prefix is transformed before the request is forwarded.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewriteConfig {
    /// Remove the matched prefix, keeping the remainder of the path.
    #[default]
    Strip,
    /// Substitute the matched prefix with a fixed path.
    Replace(String),
}

/// One entry of the route table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix the route answers for (e.g. `/api/v1/users`).
    pub prefix: String,
    /// Logical identifier of the backend service (e.g. `USER`).
    pub service: String,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

impl RouteConfig {
    /// Route that strips `prefix` and forwards to `service`.
    pub fn strip(prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
            rewrite: RewriteConfig::Strip,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound for obtaining an upstream response head, humantime format ("30s", "500ms").
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: String,
    /// Largest JSON or form body the body parsing stage will buffer.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Service identifier → upstream base address.
    #[serde(default)]
    pub services: HashMap<String, String>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parsed upstream timeout, `None` when the configured string is not a valid duration.
    pub fn upstream_timeout(&self) -> Option<Duration> {
        humantime::parse_duration(self.upstream_timeout.trim()).ok()
    }

    /// Case-insensitive lookup of a configured service address.
    pub fn service_address(&self, service: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(service))
            .map(|(_, addr)| addr.as_str())
    }

    /// Service identifiers referenced by routes, upper-cased and deduplicated.
    pub fn referenced_services(&self) -> Vec<String> {
        let mut services = self
            .routes
            .iter()
            .map(|route| route.service.trim().to_ascii_uppercase())
            .collect::<Vec<_>>();
        services.sort();
        services.dedup();
        services
    }

    /// Overlay service addresses from `<SERVICE>_SERVICE_URL` variables.
    ///
    /// Every service named by a route or by the `[services]` table is looked up
    /// through `lookup`; a non-empty value replaces the file entry. This runs once
    /// while the configuration is being loaded.
    pub fn apply_service_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ids = self.referenced_services();
        ids.extend(self.services.keys().map(|id| id.to_ascii_uppercase()));
        ids.sort();
        ids.dedup();

        for id in ids {
            let var = format!("{id}{SERVICE_URL_ENV_SUFFIX}");
            let Some(value) = lookup(&var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            self.services
                .retain(|existing, _| !existing.eq_ignore_ascii_case(&id));
            tracing::debug!(service = %id, variable = %var, "Service address taken from environment");
            self.services.insert(id, value);
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_timeout: default_upstream_timeout(),
            max_body_bytes: default_max_body_bytes(),
            services: HashMap::new(),
            routes: Vec::new(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    upstream_timeout: Option<String>,
    max_body_bytes: Option<usize>,
    services: HashMap<String, String>,
    routes: Vec<RouteConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the upstream timeout (humantime string, e.g. "5s")
    pub fn upstream_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.upstream_timeout = Some(timeout.into());
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Register a service base address
    pub fn service(mut self, id: impl Into<String>, address: impl Into<String>) -> Self {
        self.services.insert(id.into(), address.into());
        self
    }

    /// Add a route with the given path prefix and configuration
    pub fn route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        if self.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }

        Ok(ServerConfig {
            listen_addr,
            upstream_timeout: self
                .upstream_timeout
                .unwrap_or_else(default_upstream_timeout),
            max_body_bytes: self.max_body_bytes.unwrap_or_else(default_max_body_bytes),
            services: self.services,
            routes: self.routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_config() -> ServerConfig {
        ServerConfig::builder()
            .listen_addr("127.0.0.1:0")
            .service("user", "http://file-config:4001")
            .route(RouteConfig::strip("/api/v1/users", "USER"))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_routes() {
        let err = ServerConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .build()
            .unwrap_err();
        assert!(err.contains("route"));
    }

    #[test]
    fn upstream_timeout_parses_humantime() {
        let mut config = users_config();
        assert_eq!(config.upstream_timeout(), Some(Duration::from_secs(30)));

        config.upstream_timeout = "250ms".to_string();
        assert_eq!(config.upstream_timeout(), Some(Duration::from_millis(250)));

        config.upstream_timeout = "soon".to_string();
        assert_eq!(config.upstream_timeout(), None);
    }

    #[test]
    fn service_lookup_ignores_case() {
        let config = users_config();
        assert_eq!(config.service_address("USER"), Some("http://file-config:4001"));
        assert_eq!(config.service_address("User"), Some("http://file-config:4001"));
        assert_eq!(config.service_address("ORDERS"), None);
    }

    #[test]
    fn environment_overrides_file_address() {
        let mut config = users_config();
        config.apply_service_env(|var| match var {
            "USER_SERVICE_URL" => Some("http://from-env:9000".to_string()),
            _ => None,
        });

        assert_eq!(config.services.len(), 1);
        assert_eq!(config.service_address("USER"), Some("http://from-env:9000"));
    }

    #[test]
    fn environment_supplies_missing_address() {
        let mut config = ServerConfig::builder()
            .listen_addr("127.0.0.1:0")
            .route(RouteConfig::strip("/api/v1/orders", "orders"))
            .build()
            .unwrap();
        config.apply_service_env(|var| {
            (var == "ORDERS_SERVICE_URL").then(|| "http://orders:7000".to_string())
        });

        assert_eq!(config.service_address("ORDERS"), Some("http://orders:7000"));
    }

    #[test]
    fn blank_environment_value_is_ignored() {
        let mut config = users_config();
        config.apply_service_env(|_| Some("   ".to_string()));
        assert_eq!(config.service_address("USER"), Some("http://file-config:4001"));
    }

    #[test]
    fn rewrite_defaults_to_strip() {
        let route: RouteConfig =
            serde_json::from_str(r#"{"prefix":"/api","service":"USER"}"#).unwrap();
        assert_eq!(route.rewrite, RewriteConfig::Strip);

        let route: RouteConfig = serde_json::from_str(
            r#"{"prefix":"/api","service":"USER","rewrite":{"replace":"/v2"}}"#,
        )
        .unwrap();
        assert_eq!(route.rewrite, RewriteConfig::Replace("/v2".to_string()));
    }
}
