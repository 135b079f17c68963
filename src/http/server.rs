//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the single catch-all proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Run admission, forwarding and signing for each request
//! - Serve over TLS (production) or a plain listener (tests, TLS offload)
//! - Run the rate-limit sweeper alongside the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::GateConfig;
use crate::gateway::{sign_response, ForwardBody, ForwardRequest, Gateway, GatewayError};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::observability::metrics;
use crate::security::headers::client_identifier;
use crate::security::{AdmissionFilter, Outcome, RateLimiter};
use crate::signing::Signer;

/// Grace period for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionFilter>,
    pub gateway: Gateway,
    pub signer: Arc<dyn Signer>,
    pub trust_forwarded_for: bool,
}

/// HTTP server for the license gate.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and signer.
    pub fn new(config: GateConfig, signer: Arc<dyn Signer>) -> Result<Self, GatewayError> {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let admission = Arc::new(AdmissionFilter::new(&config.admission, limiter.clone()));
        let gateway = Gateway::new(&config.upstream)?;

        tracing::info!(
            allowed_paths = ?config.admission.allowed_paths,
            header_policy = ?config.admission.header_policy,
            trust_forwarded_for = config.rate_limit.trust_forwarded_for,
            "Admission configured"
        );

        let state = AppState {
            admission,
            gateway,
            signer,
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The configured router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Shared rate limiter.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Serve plain HTTP on an already bound listener until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = self.limiter.clone().spawn_sweeper(shutdown.resubscribe());
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        sweeper.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on the configured bind address until shutdown.
    pub async fn run_tls(
        self,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .config
            .listener
            .bind_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let sweeper = self.limiter.clone().spawn_sweeper(shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        sweeper.abort();
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Requests with this exact content type have their body logged.
fn is_json(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes() == b"application/json")
}

/// Main proxy handler.
/// Admits, forwards, and signs.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let log_body = is_json(&request);
    let (mut parts, body) = request.into_parts();

    let request_id = request_id(&parts.headers);
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let client = client_identifier(&parts.headers, peer, state.trust_forwarded_for);

    // 1. Admission
    if let Outcome::Reject(rejection) =
        state
            .admission
            .evaluate(&client, &method, &path, &mut parts.headers)
    {
        metrics::record_request(method.as_str(), rejection.status.as_u16(), start_time);
        return rejection.into_response();
    }

    tracing::info!(
        request_id = %request_id,
        client = %client,
        method = %method,
        path = %path,
        "Qualified request received"
    );

    // 2. Request body
    let body = if log_body {
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => {
                if bytes.is_empty() {
                    tracing::debug!(
                        request_id = %request_id,
                        "Request body is empty (Content-Type: application/json)"
                    );
                } else {
                    tracing::debug!(
                        request_id = %request_id,
                        body = %String::from_utf8_lossy(&bytes),
                        "Request body"
                    );
                }
                ForwardBody::Buffered(bytes)
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Error reading request body");
                metrics::record_request(method.as_str(), 500, start_time);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading request body")
                    .into_response();
            }
        }
    } else {
        ForwardBody::Streaming(body)
    };

    // 3. Forward
    let upstream = match state
        .gateway
        .forward(ForwardRequest {
            method: method.clone(),
            path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            peer,
        })
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_upstream_error();
            metrics::record_request(method.as_str(), 502, start_time);
            return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
        }
    };

    // 4. Sign
    let response = match sign_response(upstream, state.signer.as_ref()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream response unreadable");
            e.into_response()
        }
    };

    tracing::debug!(
        request_id = %request_id,
        status = %response.status(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
