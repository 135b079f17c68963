//! Startup orchestration.
//!
//! # Responsibilities
//! - Confirm the upstream accepts the configured API key
//! - Generate or load the TLS certificate and log its fingerprint
//! - Generate or load the response signing key pair
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Steps run in order, not concurrently

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::{GateConfig, TlsConfig, UpstreamConfig};
use crate::gateway::GatewayError;
use crate::net::tls::{certificate_fingerprint, prepare_certificate, CertificateError};
use crate::security::headers::API_KEY_HEADER;
use crate::signing::{prepare_signing_keys, Ed25519Signer, KeyError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Conditions that stop the gate from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid upstream URL: {0}")]
    UpstreamUrl(#[from] url::ParseError),

    #[error("upstream unreachable during API key check: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),

    #[error("upstream rejected the API key with status {0}")]
    CredentialRejected(StatusCode),

    #[error("TLS certificate unusable: {0}")]
    Certificate(#[source] std::io::Error),

    #[error("TLS certificate provisioning failed: {0}")]
    CertificateProvisioning(#[from] CertificateError),

    #[error("signing keys unusable: {0}")]
    SigningKeys(#[from] KeyError),

    #[error("gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}

/// Everything the server needs once startup checks have passed.
pub struct Prepared {
    pub config: GateConfig,
    pub tls: TlsConfig,
    pub signer: Arc<Ed25519Signer>,
}

/// Run the startup checks in order.
pub async fn prepare(config: GateConfig) -> Result<Prepared, StartupError> {
    if config.upstream.verify_on_startup {
        verify_upstream_credential(&config.upstream).await?;
        tracing::info!(upstream = %config.upstream.base_url, "Upstream accepted API key");
    } else {
        tracing::warn!("Skipping upstream API key check");
    }

    let tls = config.tls_paths();
    prepare_certificate(&tls)?;
    let cert_fingerprint =
        certificate_fingerprint(&tls.cert_path).map_err(StartupError::Certificate)?;
    tracing::info!(
        path = %tls.cert_path.display(),
        sha256 = %cert_fingerprint,
        "Certificate fingerprint"
    );

    let signer = prepare_signing_keys(&config.signing_paths())?;

    Ok(Prepared {
        config,
        tls,
        signer: Arc::new(signer),
    })
}

/// Issue an authenticated read against the upstream and require `200 OK`.
pub async fn verify_upstream_credential(config: &UpstreamConfig) -> Result<(), StartupError> {
    let url = Url::parse(&config.base_url)?.join(&config.probe_path)?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(PROBE_TIMEOUT)
        .build()?;

    let response = client
        .get(url)
        .header(API_KEY_HEADER, &config.api_key)
        .send()
        .await?;

    match response.status() {
        StatusCode::OK => Ok(()),
        status => {
            tracing::error!(status = %status, "API key check failed");
            Err(StartupError::CredentialRejected(status))
        }
    }
}
