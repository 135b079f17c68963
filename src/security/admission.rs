//! Request admission filter.
//!
//! Checks run in a fixed order and the first failure wins:
//! rate limit → method → path → credential header → header policy.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::{AdmissionConfig, HeaderPolicy};
use crate::observability::metrics;
use crate::security::headers::{normalize_accept_headers, API_KEY_HEADER};
use crate::security::rate_limit::RateLimiter;

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: &'static str,
}

impl Rejection {
    const fn new(status: StatusCode, reason: &'static str) -> Self {
        Self { status, reason }
    }

    fn metric_label(&self) -> &'static str {
        match self.status {
            StatusCode::TOO_MANY_REQUESTS => "rate_limited",
            StatusCode::METHOD_NOT_ALLOWED => "method",
            StatusCode::NOT_FOUND => "path",
            StatusCode::FORBIDDEN => "credential_header",
            _ => "bad_request",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status, self.reason).into_response()
    }
}

/// Result of evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Forward the request; outbound headers have been normalized.
    Admit,
    Reject(Rejection),
}

/// Decides whether an inbound request may be forwarded upstream.
pub struct AdmissionFilter {
    allowed_paths: HashSet<String>,
    header_policy: HeaderPolicy,
    limiter: Arc<RateLimiter>,
}

impl AdmissionFilter {
    pub fn new(config: &AdmissionConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            allowed_paths: config.path_set(),
            header_policy: config.header_policy,
            limiter,
        }
    }

    /// Evaluate one request. On [`Outcome::Admit`] the `Accept` and
    /// `Accept-Encoding` entries of `headers` have been rewritten.
    pub fn evaluate(
        &self,
        client: &str,
        method: &Method,
        path: &str,
        headers: &mut HeaderMap,
    ) -> Outcome {
        let outcome = self.check(client, method, path, headers);
        if let Outcome::Reject(rejection) = &outcome {
            metrics::record_rejection(rejection.metric_label());
        }
        outcome
    }

    fn check(&self, client: &str, method: &Method, path: &str, headers: &mut HeaderMap) -> Outcome {
        if self.limiter.exceeded(client) {
            tracing::warn!(client = %client, "Rate limit exceeded");
            return reject(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
        }

        if method != Method::POST {
            tracing::warn!(client = %client, method = %method, "Invalid request method");
            return reject(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        if path.is_empty() {
            tracing::warn!(client = %client, path = %path, "Empty request path");
            return reject(StatusCode::BAD_REQUEST, "Bad Request");
        }
        if !self.allowed_paths.contains(path) {
            tracing::warn!(client = %client, path = %path, "Request path not allowed");
            return reject(StatusCode::NOT_FOUND, "Not Found");
        }

        // Never log the value: it may be a real credential.
        if headers.contains_key(API_KEY_HEADER) {
            tracing::warn!(
                client = %client,
                header = %API_KEY_HEADER,
                "Client supplied upstream credential header"
            );
            return reject(StatusCode::FORBIDDEN, "Forbidden");
        }

        if self.header_policy == HeaderPolicy::RejectPreset {
            for name in [header::ACCEPT, header::ACCEPT_ENCODING] {
                if let Some(value) = headers.get(&name) {
                    tracing::warn!(
                        client = %client,
                        header = %name,
                        value = ?value,
                        "Client preset a normalized header"
                    );
                    return reject(StatusCode::BAD_REQUEST, "Bad Request");
                }
            }
        }

        normalize_accept_headers(headers);
        Outcome::Admit
    }
}

fn reject(status: StatusCode, reason: &'static str) -> Outcome {
    Outcome::Reject(Rejection::new(status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use axum::http::HeaderValue;

    const ACTIVATE: &str = "/v1/licenses/activate";

    fn filter(policy: HeaderPolicy) -> AdmissionFilter {
        let config = AdmissionConfig {
            header_policy: policy,
            ..Default::default()
        };
        AdmissionFilter::new(&config, Arc::new(RateLimiter::new(&RateLimitConfig::default())))
    }

    fn status(outcome: Outcome) -> Option<StatusCode> {
        match outcome {
            Outcome::Admit => None,
            Outcome::Reject(r) => Some(r.status),
        }
    }

    #[test]
    fn admits_allowed_post_and_normalizes() {
        let filter = filter(HeaderPolicy::Overwrite);
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        assert_eq!(filter.evaluate("c", &Method::POST, ACTIVATE, &mut headers), Outcome::Admit);
        assert_eq!(headers[header::ACCEPT], "application/json; charset=utf-8");
        assert_eq!(headers[header::ACCEPT_ENCODING], "identity");
    }

    #[test]
    fn rejects_wrong_method() {
        let filter = filter(HeaderPolicy::Overwrite);
        let outcome = filter.evaluate("c", &Method::GET, ACTIVATE, &mut HeaderMap::new());
        assert_eq!(
            outcome,
            Outcome::Reject(Rejection::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
        );
    }

    #[test]
    fn path_match_is_exact() {
        let filter = filter(HeaderPolicy::Overwrite);
        for path in [
            "/v1/licenses/activate/",
            "/v1/licenses",
            "/V1/licenses/activate",
            "/unlisted/path",
        ] {
            assert_eq!(
                status(filter.evaluate("c", &Method::POST, path, &mut HeaderMap::new())),
                Some(StatusCode::NOT_FOUND),
                "{path}"
            );
        }
        assert_eq!(
            status(filter.evaluate("c", &Method::POST, "", &mut HeaderMap::new())),
            Some(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn credential_header_is_forbidden() {
        let filter = filter(HeaderPolicy::Overwrite);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("anything"));
        assert_eq!(
            status(filter.evaluate("c", &Method::POST, ACTIVATE, &mut headers)),
            Some(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn check_order_first_failure_wins() {
        let filter = filter(HeaderPolicy::Overwrite);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("anything"));

        // Method is checked before path and credential.
        assert_eq!(
            status(filter.evaluate("c", &Method::GET, "/nope", &mut headers)),
            Some(StatusCode::METHOD_NOT_ALLOWED)
        );
        // Path is checked before credential.
        assert_eq!(
            status(filter.evaluate("c", &Method::POST, "/nope", &mut headers)),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[test]
    fn rate_limit_checked_first_and_counts_rejected_requests() {
        let filter = filter(HeaderPolicy::Overwrite);
        for _ in 0..10 {
            filter.evaluate("busy", &Method::GET, "/nope", &mut HeaderMap::new());
        }
        assert_eq!(
            status(filter.evaluate("busy", &Method::POST, ACTIVATE, &mut HeaderMap::new())),
            Some(StatusCode::TOO_MANY_REQUESTS)
        );
        assert_eq!(
            status(filter.evaluate("other", &Method::POST, ACTIVATE, &mut HeaderMap::new())),
            None
        );
    }

    #[test]
    fn reject_preset_policy() {
        let filter = filter(HeaderPolicy::RejectPreset);

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert_eq!(
            status(filter.evaluate("c", &Method::POST, ACTIVATE, &mut headers)),
            Some(StatusCode::BAD_REQUEST)
        );

        let mut clean = HeaderMap::new();
        assert_eq!(filter.evaluate("c", &Method::POST, ACTIVATE, &mut clean), Outcome::Admit);
        assert_eq!(clean[header::ACCEPT_ENCODING], "identity");
    }

    #[test]
    fn rejection_renders_plain_text() {
        let response = Rejection::new(StatusCode::FORBIDDEN, "Forbidden").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
