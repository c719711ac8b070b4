//! Logical service identifier → upstream base address.
//!
//! Built once from the loaded [`ServerConfig`]; never mutated afterwards.
use std::{collections::HashMap, sync::Arc};

use url::{Position, Url};

use crate::{config::ServerConfig, core::error::ConfigurationError};

/// A backend reachable at an absolute `http`/`https` base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    id: String,
    base: Url,
}

impl ServiceEndpoint {
    /// Parse a base address for service `id`.
    pub fn new(id: impl Into<String>, address: &str) -> Result<Self, ConfigurationError> {
        let id = id.into().trim().to_ascii_uppercase();
        let invalid = |reason: String| ConfigurationError::InvalidServiceAddress {
            service: id.clone(),
            address: address.to_string(),
            reason,
        };

        let base = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        if base.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        if base.query().is_some() || base.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }

        Ok(Self { id, base })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `scheme://authority` of the base address, e.g. `http://users.internal:4001`.
    pub fn origin(&self) -> &str {
        &self.base[..Position::BeforePath]
    }

    /// `host[:port]` as it should appear in the outgoing `Host` header.
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Join a rewritten path and optional query onto the base address.
    ///
    /// An empty `rest` targets the base address itself. Exactly one `/`
    /// separates the base path from `rest`.
    pub fn target(&self, rest: &str, query: Option<&str>) -> String {
        let base_path = self.base.path();
        let path = if rest.is_empty() {
            base_path.to_string()
        } else {
            let trimmed = base_path.trim_end_matches('/');
            if rest.starts_with('/') {
                format!("{trimmed}{rest}")
            } else {
                format!("{trimmed}/{rest}")
            }
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        match query {
            Some(q) => format!("{}{}?{}", self.origin(), path, q),
            None => format!("{}{}", self.origin(), path),
        }
    }
}

/// Fixed table of known services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    endpoints: HashMap<String, Arc<ServiceEndpoint>>,
}

impl ServiceRegistry {
    /// Build the registry from configuration.
    ///
    /// Every service named by a route must have a non-empty, parseable
    /// address; otherwise startup fails. Entries no route uses are still
    /// parsed so typos surface early.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigurationError> {
        let mut endpoints = HashMap::new();

        for (id, address) in &config.services {
            if address.trim().is_empty() {
                continue;
            }
            let endpoint = ServiceEndpoint::new(id.as_str(), address)?;
            endpoints.insert(endpoint.id().to_string(), Arc::new(endpoint));
        }

        for route in &config.routes {
            let service = route.service.trim().to_ascii_uppercase();
            if !endpoints.contains_key(&service) {
                return Err(ConfigurationError::MissingServiceAddress {
                    service,
                    route: route.prefix.clone(),
                });
            }
        }

        for endpoint in endpoints.values() {
            tracing::info!(service = %endpoint.id(), address = %endpoint.base_url(), "Registered service");
        }

        Ok(Self { endpoints })
    }

    /// Resolve a service identifier (case-insensitive) to its endpoint.
    pub fn lookup(&self, service_id: &str) -> Option<Arc<ServiceEndpoint>> {
        self.endpoints
            .get(&service_id.trim().to_ascii_uppercase())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Service identifiers in sorted order.
    pub fn service_ids(&self) -> Vec<&str> {
        let mut ids = self.endpoints.keys().map(String::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}
