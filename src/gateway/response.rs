//! Response interception and signing.
//!
//! Runs after [`Gateway::forward`](super::Gateway::forward) and before the
//! response is written to the client. The upstream body is read to
//! completion, signed, and reassembled byte-for-byte.

use axum::body::{to_bytes, Body};
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

use crate::gateway::forward::UpstreamResponse;
use crate::observability::metrics;
use crate::security::headers::SIGNATURE_HEADER;
use crate::signing::Signer;

/// The upstream body could not be read.
///
/// Carries the response the client should receive instead: the upstream
/// status line is dropped in favour of `502` with an empty body.
#[derive(Debug, Error)]
#[error("failed to read upstream response body: {source}")]
pub struct BodyReadError {
    #[source]
    pub source: axum::Error,
}

impl IntoResponse for BodyReadError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_GATEWAY, Body::empty()).into_response()
    }
}

/// Statuses that never carry a body.
fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Buffer the upstream body and attach a signature header when it is
/// non-empty. Signing failures are logged and leave the response unsigned.
pub async fn sign_response(
    upstream: UpstreamResponse,
    signer: &dyn Signer,
) -> Result<Response<Body>, BodyReadError> {
    let UpstreamResponse {
        status,
        mut headers,
        body,
    } = upstream;
    // Only a signature produced here may reach the client.
    headers.remove(SIGNATURE_HEADER);

    if is_bodiless(status) {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        return Ok(response);
    }

    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|source| BodyReadError { source })?;

    if bytes.is_empty() {
        metrics::record_signature("empty");
    } else {
        match signer.sign(&bytes) {
            Ok(signature) => match HeaderValue::try_from(signature) {
                Ok(value) => {
                    headers.insert(SIGNATURE_HEADER, value);
                    metrics::record_signature("signed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Signature is not a valid header value");
                    metrics::record_signature("failed");
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to sign response body");
                metrics::record_signature("failed");
            }
        }
    }

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
