use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Human readable multi-line output for development.
    Pretty,
}

/// Build the filter from `RUST_LOG`, falling back to `default_level`.
fn env_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .wrap_err_with(|| format!("Invalid log level: {default_level}")),
    }
}

/// Install the global subscriber.
///
/// Fails if the level is not a valid filter directive or a global subscriber
/// is already installed.
pub fn init_tracing(format: LogFormat, default_level: &str) -> Result<()> {
    let filter = env_filter(default_level)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init(),
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(?format, level = default_level, "Structured logging initialized");
    Ok(())
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
    )
}

/// Create an upstream request span
pub fn create_upstream_span(service_uri: &str, method: &str) -> tracing::Span {
    tracing::info_span!(
        "upstream_request",
        upstream.uri = service_uri,
        http.method = method,
        http.status_code = tracing::field::Empty,
    )
}
