//! Static route table and longest‑prefix resolver.
//!
//! Each [`Route`] is bound at startup to the [`ServiceEndpoint`] of its
//! service, so resolving a path yields everything the forwarder needs without
//! touching the registry again.
use std::{collections::HashSet, sync::Arc};

use crate::{
    config::{RewriteConfig, RouteConfig},
    core::{
        error::ConfigurationError,
        registry::{ServiceEndpoint, ServiceRegistry},
    },
};

/// How the matched prefix is transformed in the outgoing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteRule {
    Strip,
    Replace(String),
}

impl RewriteRule {
    /// Apply the rule to `path`, which must start with `prefix`.
    pub fn apply(&self, prefix: &str, path: &str) -> String {
        let rest = path.strip_prefix(prefix).unwrap_or(path);
        match self {
            RewriteRule::Strip => rest.to_string(),
            RewriteRule::Replace(replacement) => {
                if rest.is_empty() {
                    replacement.clone()
                } else if replacement.ends_with('/') || rest.starts_with('/') {
                    format!("{}{}", replacement.trim_end_matches('/'), ensure_leading(rest))
                } else {
                    format!("{replacement}/{rest}")
                }
            }
        }
    }
}

fn ensure_leading(rest: &str) -> String {
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

impl From<&RewriteConfig> for RewriteRule {
    fn from(config: &RewriteConfig) -> Self {
        match config {
            RewriteConfig::Strip => RewriteRule::Strip,
            RewriteConfig::Replace(path) => RewriteRule::Replace(path.clone()),
        }
    }
}

/// A registered prefix bound to its upstream.
#[derive(Debug, Clone)]
pub struct Route {
    prefix: String,
    rewrite: RewriteRule,
    endpoint: Arc<ServiceEndpoint>,
}

impl Route {
    pub fn new(
        prefix: impl Into<String>,
        rewrite: RewriteRule,
        endpoint: Arc<ServiceEndpoint>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            rewrite,
            endpoint,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn service_id(&self) -> &str {
        self.endpoint.id()
    }

    pub fn rewrite(&self) -> &RewriteRule {
        &self.rewrite
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Path the upstream sees, before it is joined onto the base address.
    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrite.apply(&self.prefix, path)
    }

    /// Absolute upstream target for an incoming path and query.
    pub fn upstream_target(&self, path: &str, query: Option<&str>) -> String {
        self.endpoint.target(&self.rewrite_path(path), query)
    }
}

/// Immutable, ordered list of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Bind every configured route to its service endpoint.
    pub fn build(
        routes: &[RouteConfig],
        registry: &ServiceRegistry,
    ) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut table = Vec::with_capacity(routes.len());

        for config in routes {
            if config.prefix.is_empty() || !config.prefix.starts_with('/') {
                return Err(ConfigurationError::InvalidPrefix {
                    prefix: config.prefix.clone(),
                    reason: "must be non-empty and start with '/'".to_string(),
                });
            }
            if !seen.insert(config.prefix.as_str()) {
                return Err(ConfigurationError::DuplicatePrefix {
                    prefix: config.prefix.clone(),
                });
            }
            let endpoint = registry.lookup(&config.service).ok_or_else(|| {
                ConfigurationError::MissingServiceAddress {
                    service: config.service.trim().to_ascii_uppercase(),
                    route: config.prefix.clone(),
                }
            })?;

            tracing::info!(
                prefix = %config.prefix,
                service = %endpoint.id(),
                rewrite = ?config.rewrite,
                "Configured route"
            );
            table.push(Route::new(
                config.prefix.clone(),
                RewriteRule::from(&config.rewrite),
                endpoint,
            ));
        }

        Ok(Self { routes: table })
    }

    /// Longest‑prefix match; registration order never changes the winner.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.prefix.len())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn table(routes: &[(&str, &str)]) -> RouteTable {
        let mut config = ServerConfig::default();
        config
            .services
            .insert("USER".to_string(), "http://users.internal:4001".to_string());
        config
            .services
            .insert("ADMIN".to_string(), "http://admin.internal:4002".to_string());
        for (prefix, service) in routes {
            config.routes.push(RouteConfig::strip(*prefix, *service));
        }
        let registry = ServiceRegistry::from_config(&config).unwrap();
        RouteTable::build(&config.routes, &registry).unwrap()
    }

    #[test]
    fn resolves_and_strips_prefix() {
        let table = table(&[("/api/v1/users", "USER")]);

        for path in ["/api/v1/users", "/api/v1/users/42", "/api/v1/users/42/roles"] {
            let route = table.resolve(path).unwrap();
            assert_eq!(route.prefix(), "/api/v1/users");
            assert_eq!(
                route.rewrite_path(path),
                path.strip_prefix("/api/v1/users").unwrap()
            );
        }
    }

    #[test]
    fn unmatched_path_resolves_to_none() {
        let table = table(&[("/api/v1/users", "USER")]);
        assert!(table.resolve("/api/v2/unknown").is_none());
        assert!(table.resolve("/").is_none());
        assert!(table.resolve("/api/v1/user").is_none());
    }

    #[test]
    fn longest_prefix_wins_regardless_of_order() {
        let orders = [
            [("/api/v1/users", "USER"), ("/api/v1/users/admin", "ADMIN")],
            [("/api/v1/users/admin", "ADMIN"), ("/api/v1/users", "USER")],
        ];

        for routes in orders {
            let table = table(&routes);
            assert_eq!(
                table.resolve("/api/v1/users/admin/7").unwrap().service_id(),
                "ADMIN"
            );
            assert_eq!(table.resolve("/api/v1/users/7").unwrap().service_id(), "USER");
        }
    }

    #[test]
    fn nested_prefix_chain_picks_deepest() {
        let table = table(&[
            ("/", "USER"),
            ("/api", "USER"),
            ("/api/v1", "ADMIN"),
            ("/api/v1/users", "USER"),
        ]);
        assert_eq!(table.resolve("/api/v1/users/1").unwrap().prefix(), "/api/v1/users");
        assert_eq!(table.resolve("/api/v1/orders").unwrap().prefix(), "/api/v1");
        assert_eq!(table.resolve("/api/v2").unwrap().prefix(), "/api");
        assert_eq!(table.resolve("/health").unwrap().prefix(), "/");
    }

    #[test]
    fn upstream_target_preserves_query() {
        let table = table(&[("/api/v1/users", "USER")]);
        let route = table.resolve("/api/v1/users/42").unwrap();
        assert_eq!(
            route.upstream_target("/api/v1/users/42", Some("fields=name&x=%20")),
            "http://users.internal:4001/42?fields=name&x=%20"
        );
        assert_eq!(
            route.upstream_target("/api/v1/users", None),
            "http://users.internal:4001/"
        );
    }

    #[test]
    fn replace_rule_substitutes_prefix() {
        let rule = RewriteRule::Replace("/users".to_string());
        assert_eq!(rule.apply("/api/v1/users", "/api/v1/users"), "/users");
        assert_eq!(rule.apply("/api/v1/users", "/api/v1/users/42"), "/users/42");
        assert_eq!(rule.apply("/api/v1/users", "/api/v1/userstats"), "/users/tats");

        let trailing = RewriteRule::Replace("/v2/".to_string());
        assert_eq!(trailing.apply("/api/", "/api/items"), "/v2/items");
    }

    #[test]
    fn duplicate_prefix_is_rejected() {
        let mut config = ServerConfig::default();
        config
            .services
            .insert("USER".to_string(), "http://users.internal:4001".to_string());
        config.routes.push(RouteConfig::strip("/api", "USER"));
        config.routes.push(RouteConfig::strip("/api", "USER"));
        let registry = ServiceRegistry::from_config(&config).unwrap();

        assert_eq!(
            RouteTable::build(&config.routes, &registry).unwrap_err(),
            ConfigurationError::DuplicatePrefix {
                prefix: "/api".to_string()
            }
        );
    }
}
