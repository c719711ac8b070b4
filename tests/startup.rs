// Startup ordering: configuration problems stop the gateway before it listens.
use std::io::Write;

use edge_gateway::{GatewayServer, config::load_config, core::ConfigurationError};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn missing_service_address_never_binds() {
    let port = free_port().await;
    let file = write_config(&format!(
        r#"
listen_addr = "127.0.0.1:{port}"

[[routes]]
prefix = "/api/v1/ledger"
service = "LEDGER_STARTUP_TEST"
"#
    ));

    let config = load_config(file.path().to_str().unwrap()).await.unwrap();
    let err = match GatewayServer::from_config(&config) {
        Ok(_) => panic!("gateway built without a service address"),
        Err(err) => err,
    };

    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::MissingServiceAddress { service, .. })
            if service == "LEDGER_STARTUP_TEST"
    ));

    // Nothing holds the configured port.
    assert!(
        tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn invalid_service_address_is_rejected() {
    let file = write_config(
        r#"
listen_addr = "127.0.0.1:0"

[services]
BILLING = "ftp://billing.internal"

[[routes]]
prefix = "/api/v1/billing"
service = "BILLING"
"#,
    );

    let config = load_config(file.path().to_str().unwrap()).await.unwrap();
    let err = GatewayServer::from_config(&config).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::InvalidServiceAddress { .. })
    ));
}
