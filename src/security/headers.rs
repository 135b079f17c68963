//! Header names and header manipulation.
//!
//! # Responsibilities
//! - Name the credential, signature and forwarding headers
//! - Normalize `Accept` / `Accept-Encoding` for byte-exact signing
//! - Strip hop-by-hop headers in both directions
//! - Derive the client identifier used for rate limiting

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Upstream credential header. Clients must never send it.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Response header carrying the base64 Ed25519 signature of the body.
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-api-signature");

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

pub const ACCEPT_JSON: HeaderValue = HeaderValue::from_static("application/json; charset=utf-8");
pub const IDENTITY_ENCODING: HeaderValue = HeaderValue::from_static("identity");

/// Headers that describe a single connection and are not forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Force JSON responses without content encoding so the body the upstream
/// returns is exactly the body that gets signed.
pub fn normalize_accept_headers(headers: &mut HeaderMap) {
    headers.insert(header::ACCEPT, ACCEPT_JSON);
    headers.insert(header::ACCEPT_ENCODING, IDENTITY_ENCODING);
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Append the peer address to `X-Forwarded-For`.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let ip = peer.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Identify the client for rate limiting.
///
/// `X-Forwarded-For` can be set by anyone talking to the gate directly, so it
/// is only honoured when `trust_forwarded_for` is set.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: SocketAddr,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "198.51.100.4:51000".parse().unwrap()
    }

    #[test]
    fn normalize_overwrites_client_values() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));

        normalize_accept_headers(&mut headers);

        assert_eq!(headers[header::ACCEPT], "application/json; charset=utf-8");
        assert_eq!(headers[header::ACCEPT_ENCODING], "identity");
        assert_eq!(headers.get_all(header::ACCEPT).iter().count(), 1);
    }

    #[test]
    fn strips_hop_by_hop_and_connection_listed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-trace-hop"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn forwarded_for_appends_peer() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, peer());
        assert_eq!(headers[&X_FORWARDED_FOR], "198.51.100.4");

        append_forwarded_for(&mut headers, "10.0.0.1:1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "198.51.100.4, 10.0.0.1");
    }

    #[test]
    fn identifier_prefers_forwarded_for_when_trusted() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers, peer(), true), "198.51.100.4");

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_identifier(&headers, peer(), true), "203.0.113.9");
        assert_eq!(client_identifier(&headers, peer(), false), "198.51.100.4");
    }
}
