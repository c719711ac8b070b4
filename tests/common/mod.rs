// Shared harness: a recording upstream and a gateway bound to ephemeral ports.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use edge_gateway::{GatewayServer, GracefulShutdown, config::ServerConfig};

/// What an upstream received for one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fake backend service that records every request it receives.
///
/// Special paths: `/slow...` answers after two seconds, `/status/<code>`
/// answers with that status, `/large` returns a 512 KiB body. A `/slow`
/// handler dropped before it finishes is counted as cancelled.
pub struct Upstream {
    pub addr: SocketAddr,
    pub name: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    cancelled: Arc<AtomicUsize>,
}

impl Upstream {
    pub async fn spawn(name: &'static str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let app = Router::new().fallback(record).with_state(UpstreamState {
            name,
            requests: requests.clone(),
            cancelled: cancelled.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            name,
            requests,
            cancelled,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `/slow` handlers dropped before they could answer.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn single_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "{} saw {:?}", self.name, requests);
        requests.into_iter().next().unwrap()
    }
}

#[derive(Clone)]
struct UpstreamState {
    name: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    cancelled: Arc<AtomicUsize>,
}

/// Counts a cancellation when dropped without `finish`.
struct CancelGuard {
    cancelled: Arc<AtomicUsize>,
    finished: bool,
}

impl CancelGuard {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

async fn record(
    State(UpstreamState {
        name,
        requests,
        cancelled,
    }): State<UpstreamState>,
    req: Request,
) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path_and_query: path_and_query.clone(),
        headers: parts.headers,
        body,
    });

    let path = parts.uri.path();
    if path.starts_with("/slow") {
        let guard = CancelGuard {
            cancelled,
            finished: false,
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        guard.finish();
    }

    let status = path
        .strip_prefix("/status/")
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let body = if path == "/large" {
        Body::from(vec![b'x'; 512 * 1024])
    } else {
        Body::from(
            serde_json::json!({ "service": name, "path": path_and_query }).to_string(),
        )
    };

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-upstream-service", name)
        .body(body)
        .unwrap()
}

/// A running gateway; dropping it does not stop the server, call `shutdown`.
pub struct Gateway {
    pub addr: SocketAddr,
    shutdown: GracefulShutdown,
}

impl Gateway {
    pub async fn spawn(mut config: ServerConfig) -> Self {
        config.listen_addr = "127.0.0.1:0".to_string();
        let bound = GatewayServer::from_config(&config)
            .unwrap()
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr();

        let shutdown = GracefulShutdown::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move { bound.serve(server_shutdown).await });

        Self { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn shutdown(&self) {
        self.shutdown
            .trigger_shutdown(edge_gateway::ShutdownReason::Requested);
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}
