//! Upstream forwarding.
//!
//! # Responsibilities
//! - Rewrite the destination to the configured upstream scheme and host
//! - Inject the server-held credential, replacing any inbound value
//! - Relay the request body and return the upstream response unread
//!
//! # Design Decisions
//! - No retries and no per-request deadline; only a connect timeout
//! - Redirects are returned to the caller, never followed
//! - Transport failures surface as `GatewayError`, mapped to 502 by the handler

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop, API_KEY_HEADER};

/// Errors raised while relaying a request upstream.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The upstream base URL or the credential cannot be used.
    #[error("invalid upstream destination: {0}")]
    InvalidDestination(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connecting to or exchanging data with the upstream failed.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Body of a request being forwarded.
pub enum ForwardBody {
    /// Already read by the handler (e.g. for logging).
    Buffered(Bytes),
    /// Relayed chunk by chunk as it arrives from the client.
    Streaming(Body),
}

/// An admitted request, ready to relay.
pub struct ForwardRequest {
    pub method: Method,
    /// Inbound path, forwarded unchanged.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: ForwardBody,
    pub peer: SocketAddr,
}

/// Status, headers and unread body returned by the upstream.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Relays admitted requests to the licensing backend.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base: Url,
    credential: HeaderValue,
}

impl Gateway {
    pub fn new(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::InvalidDestination(format!("{}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(GatewayError::InvalidDestination(config.base_url.clone()));
        }

        let mut credential = HeaderValue::from_str(&config.api_key).map_err(|_| {
            GatewayError::InvalidDestination("API key is not a valid header value".to_string())
        })?;
        credential.set_sensitive(true);

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            client,
            base,
            credential,
        })
    }

    /// Upstream URL a request for `path` / `query` is sent to.
    pub fn destination(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// Send the request upstream and hand back the response with its body
    /// still unread.
    pub async fn forward(&self, request: ForwardRequest) -> Result<UpstreamResponse, GatewayError> {
        let url = self.destination(&request.path, request.query.as_deref());

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        // The client sets Host from the destination URL.
        headers.remove(header::HOST);
        append_forwarded_for(&mut headers, request.peer);
        headers.insert(API_KEY_HEADER, self.credential.clone());

        let body = match request.body {
            ForwardBody::Buffered(bytes) => reqwest::Body::from(bytes),
            ForwardBody::Streaming(body) => reqwest::Body::wrap_stream(body.into_data_stream()),
        };

        tracing::debug!(method = %request.method, url = %url, "Forwarding request upstream");

        let response = self
            .client
            .request(request.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        Ok(UpstreamResponse {
            status,
            headers,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base_url: &str) -> Result<Gateway, GatewayError> {
        Gateway::new(&UpstreamConfig {
            base_url: base_url.into(),
            api_key: "creem_test_key".into(),
            ..Default::default()
        })
    }

    #[test]
    fn destination_replaces_scheme_and_host_only() {
        let gateway = gateway("https://api.creem.io").unwrap();
        let url = gateway.destination("/v1/licenses/activate", None);
        assert_eq!(url.as_str(), "https://api.creem.io/v1/licenses/activate");

        let url = gateway.destination("/v1/licenses/validate", Some("trace=1"));
        assert_eq!(url.as_str(), "https://api.creem.io/v1/licenses/validate?trace=1");
    }

    #[test]
    fn destination_keeps_upstream_port() {
        let gateway = gateway("http://127.0.0.1:18080/ignored/base").unwrap();
        let url = gateway.destination("/v1/licenses/deactivate", None);
        assert_eq!(url.as_str(), "http://127.0.0.1:18080/v1/licenses/deactivate");
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        assert!(matches!(gateway("not a url"), Err(GatewayError::InvalidDestination(_))));
        assert!(matches!(
            gateway("mailto:ops@example.com"),
            Err(GatewayError::InvalidDestination(_))
        ));
    }

    #[test]
    fn credential_must_be_header_safe() {
        let result = Gateway::new(&UpstreamConfig {
            api_key: "line\nbreak".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(GatewayError::InvalidDestination(_))));
    }
}
