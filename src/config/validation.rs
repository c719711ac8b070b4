use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;

use crate::config::models::{RewriteConfig, RouteConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error(
        "Service '{service}' used by route '{route}' has no address (set services.{service} or {service}_SERVICE_URL)"
    )]
    MissingServiceAddress { service: String, route: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem found.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let errors = Self::collect_errors(config);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Run every check and return the individual errors.
    pub fn collect_errors(config: &ServerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_upstream_timeout(config) {
            errors.push(e);
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }

        for route in &config.routes {
            if let Err(mut route_errors) = Self::validate_single_route(route) {
                errors.append(&mut route_errors);
            }
        }

        if let Err(mut conflicts) = Self::check_route_conflicts(&config.routes) {
            errors.append(&mut conflicts);
        }

        if let Err(mut service_errors) = Self::validate_services(config) {
            errors.append(&mut service_errors);
        }

        errors
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_upstream_timeout(config: &ServerConfig) -> ValidationResult<()> {
        match config.upstream_timeout() {
            Some(timeout) if !timeout.is_zero() => Ok(()),
            Some(_) => Err(ValidationError::InvalidField {
                field: "upstream_timeout".to_string(),
                message: "Must be greater than 0".to_string(),
            }),
            None => Err(ValidationError::InvalidField {
                field: "upstream_timeout".to_string(),
                message: format!(
                    "'{}' is not a duration (use e.g. '30s', '500ms')",
                    config.upstream_timeout
                ),
            }),
        }
    }

    /// Validate a single route configuration
    fn validate_single_route(route: &RouteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let prefix = &route.prefix;

        if prefix.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "route prefix".to_string(),
                message: "Route prefixes cannot be empty".to_string(),
            });
        } else if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route prefix: {prefix}"),
                message: "Route prefixes must start with '/'".to_string(),
            });
        }

        if route.service.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route '{prefix}' service"),
            });
        }

        if let RewriteConfig::Replace(replacement) = &route.rewrite {
            if let Err(e) = Self::validate_path_rewrite(prefix, replacement) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate path rewrite configuration
    fn validate_path_rewrite(prefix: &str, rewrite: &str) -> ValidationResult<()> {
        if rewrite.is_empty() {
            return Err(ValidationError::InvalidField {
                field: format!("route '{prefix}' rewrite.replace"),
                message: "Path rewrite cannot be empty".to_string(),
            });
        }

        if !rewrite.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field: format!("route '{prefix}' rewrite.replace"),
                message: "Path rewrite must start with '/'".to_string(),
            });
        }

        Ok(())
    }

    /// Identical prefixes are ambiguous; overlapping ones are resolved by longest match.
    fn check_route_conflicts(routes: &[RouteConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for route in routes {
            if !seen.insert(route.prefix.as_str()) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("Duplicate route configuration for prefix '{}'", route.prefix),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every configured address must be usable, and every route's service must have one.
    fn validate_services(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (id, address) in &config.services {
            if address.trim().is_empty() {
                continue;
            }
            if let Err(e) = Self::validate_url(address, &format!("services.{id}")) {
                errors.push(e);
            }
        }

        let mut reported = HashSet::new();
        for route in &config.routes {
            let service = route.service.trim();
            if service.is_empty() {
                continue;
            }
            let has_address = config
                .service_address(service)
                .is_some_and(|addr| !addr.trim().is_empty());
            if !has_address && reported.insert(service.to_ascii_uppercase()) {
                errors.push(ValidationError::MissingServiceAddress {
                    service: service.to_ascii_uppercase(),
                    route: route.prefix.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str.trim()) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Base address cannot carry a query or fragment".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
