//! Edge gateway: a single entry point that forwards prefix-routed HTTP calls
//! to named backend services.
//!
//! A fixed table of path prefixes maps to logical service identifiers (`USER`,
//! `SETTINGS`, ...) whose base addresses come from configuration or from
//! `<ID>_SERVICE_URL` environment variables. Each request is matched by the
//! longest registered prefix, the prefix is stripped, and the call is replayed
//! against the service with method, headers and query intact. Bodies of
//! `POST`/`PUT`/`PATCH` requests have already been parsed by then, so they are
//! re-serialized before dispatch with an exact `Content-Length`.
//!
//! # Quick Example
//! ```no_run
//! use edge_gateway::{GatewayServer, GracefulShutdown, config::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config("gateway.toml").await?;
//! let server = GatewayServer::from_config(&config)?.bind().await?;
//! server.serve(GracefulShutdown::new()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing and request planning inside `core`, free of I/O.
//!
//! # Error Handling
//! Startup and CLI code returns `eyre::Result<T>` with `WrapErr` context.
//! Per-request failures are [`core::GatewayError`] values, each mapped to one
//! HTTP status at the handler boundary.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{GatewayServer, HttpClientAdapter, HttpHandler},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::{GracefulShutdown, ShutdownReason},
};
