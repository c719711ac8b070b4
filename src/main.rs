use std::path::Path;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use edge_gateway::{
    GatewayServer, GracefulShutdown,
    config::{ServerConfigValidator, load_config},
    tracing_setup::{self, LogFormat},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    /// Default log filter when RUST_LOG is unset
    #[clap(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config, args.log_format, &args.log_level).await,
        None => serve(&args.config, args.log_format, &args.log_level).await,
    }
}

/// Load, build, bind and serve until SIGINT/SIGTERM.
async fn serve(config_path: &str, log_format: LogFormat, log_level: &str) -> Result<()> {
    tracing_setup::init_tracing(log_format, log_level)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    let server = GatewayServer::from_config(&config)?;
    for route in server.handler().gateway_service().routes().routes() {
        tracing::info!(
            prefix = route.prefix(),
            service = route.service_id(),
            target = %route.endpoint().base_url(),
            "Route active"
        );
    }

    let bound = server.bind().await?;
    println!("Edge gateway listening on {}", bound.local_addr());

    let shutdown = GracefulShutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move { signal_shutdown.run_signal_handler().await });

    bound.serve(shutdown).await?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        return Err(eyre!("Configuration file '{config_path}' not found"));
    }

    let config = load_config(config_path)
        .await
        .wrap_err("Configuration parsing failed")?;
    println!("✅ Configuration parsing: OK");

    let errors = ServerConfigValidator::collect_errors(&config);
    if !errors.is_empty() {
        eprintln!("❌ Configuration validation failed:");
        for error in &errors {
            eprintln!("   • {error}");
        }
        println!();
        println!("💡 Common fixes:");
        println!("   • Ensure every service address starts with http:// or https://");
        println!("   • Set <SERVICE>_SERVICE_URL for services without an address");
        println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
        println!("   • Use humantime durations for upstream_timeout (e.g., '30s')");
        return Err(eyre!("{} validation error(s)", errors.len()));
    }

    println!("✅ Configuration validation: OK");
    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!("   • Upstream Timeout: {}", config.upstream_timeout);
    println!("   • Services: {}", config.services.len());
    for route in &config.routes {
        println!(
            "   • {} -> {} ({:?})",
            route.prefix,
            route.service.to_ascii_uppercase(),
            route.rewrite
        );
    }
    Ok(())
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        return Err(eyre!("Configuration file '{config_path}' already exists"));
    }

    let default_config = r#"# Edge gateway configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Upper bound for receiving an upstream response head
upstream_timeout = "30s"

# Largest JSON or form body accepted for POST/PUT/PATCH; other uploads stream
max_body_bytes = 1048576

# Service identifier -> base address.
# USER_SERVICE_URL in the environment overrides the entry for USER.
[services]
USER = "http://127.0.0.1:4001"

# The longest matching prefix wins; the prefix is stripped by default.
[[routes]]
prefix = "/api/v1/users"
service = "USER"

# [[routes]]
# prefix = "/api/v1/settings"
# service = "SETTINGS"
# rewrite = { replace = "/v1/settings" }
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'edge-gateway serve --config {config_path}' to start the server");
    Ok(())
}
