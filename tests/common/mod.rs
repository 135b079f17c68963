//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use ed25519_dalek::SigningKey;
use license_gate::config::GateConfig;
use license_gate::http::HttpServer;
use license_gate::lifecycle::Shutdown;
use license_gate::signing::Ed25519Signer;
use tokio::net::TcpListener;

pub const TEST_API_KEY: &str = "creem_test_server_key";

/// What the mock backend saw.
#[derive(Default)]
pub struct Recorded {
    pub calls: AtomicU32,
    pub last_headers: Mutex<Option<HeaderMap>>,
    pub last_path: Mutex<Option<String>>,
    pub last_body: Mutex<Option<Vec<u8>>>,
}

impl Recorded {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|h| h.get(name))
            .map(|v| v.to_str().unwrap().to_string())
    }
}

#[derive(Clone)]
struct Backend {
    recorded: Arc<Recorded>,
    status: StatusCode,
    body: &'static str,
}

async fn backend_handler(State(backend): State<Backend>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();

    backend.recorded.calls.fetch_add(1, Ordering::SeqCst);
    *backend.recorded.last_headers.lock().unwrap() = Some(parts.headers);
    *backend.recorded.last_path.lock().unwrap() = Some(parts.uri.path().to_string());
    *backend.recorded.last_body.lock().unwrap() = Some(bytes.to_vec());

    (
        backend.status,
        [("content-type", "application/json")],
        backend.body,
    )
        .into_response()
}

/// Start a mock licensing backend answering every request with `status` and `body`.
pub async fn start_mock_backend(
    status: StatusCode,
    body: &'static str,
) -> (SocketAddr, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/{*path}", any(backend_handler))
        .with_state(Backend {
            recorded: recorded.clone(),
            status,
            body,
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, recorded)
}

/// Address with nothing listening behind it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn test_signer() -> Arc<Ed25519Signer> {
    Arc::new(Ed25519Signer::new(SigningKey::from_bytes(&[42u8; 32])))
}

pub fn gate_config(upstream: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.api_key = TEST_API_KEY.to_string();
    config.upstream.verify_on_startup = false;
    config
}

/// A running gate on plain HTTP. Dropping `shutdown` closes the broadcast
/// channel, which stops the server and its sweeper, so keep it alive for the
/// duration of the test.
pub struct RunningGate {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl RunningGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gate(config: GateConfig, signer: Arc<Ed25519Signer>) -> RunningGate {
    let server = HttpServer::new(config, signer).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningGate { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
