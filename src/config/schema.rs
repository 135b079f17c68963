//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default directory holding TLS material and signing keys.
pub const DEFAULT_DATA_DIR: &str = "/app/data/";

/// Root configuration for the license gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Base directory for derived TLS and signing key paths.
    pub data_dir: PathBuf,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// TLS certificate and key; derived from `data_dir` when unset.
    pub tls: Option<TlsConfig>,

    /// Licensing backend the gate forwards to.
    pub upstream: UpstreamConfig,

    /// Request admission rules.
    pub admission: AdmissionConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Response signing key locations; derived from `data_dir` when unset.
    pub signing: Option<SigningConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GateConfig {
    /// Effective TLS file locations.
    pub fn tls_paths(&self) -> TlsConfig {
        self.tls
            .clone()
            .unwrap_or_else(|| TlsConfig::under(&self.data_dir))
    }

    /// Effective signing key locations.
    pub fn signing_paths(&self) -> SigningConfig {
        self.signing
            .clone()
            .unwrap_or_else(|| SigningConfig::under(&self.data_dir))
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            tls: None,
            signing: None,
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            admission: AdmissionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Standard layout below a data directory.
    pub fn under(data_dir: &Path) -> Self {
        let dir = data_dir.join("server_ssl");
        Self {
            cert_path: dir.join("public.key"),
            key_path: dir.join("private.key"),
        }
    }
}

/// Upstream licensing backend.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Scheme and host of the backend (e.g., "https://api.creem.io").
    pub base_url: String,

    /// Secret API key injected into every forwarded request.
    pub api_key: String,

    /// Probe the backend with the API key before accepting traffic.
    pub verify_on_startup: bool,

    /// Path used by the startup probe.
    pub probe_path: String,

    /// TCP connect timeout towards the backend.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.creem.io".to_string(),
            api_key: String::new(),
            verify_on_startup: true,
            probe_path: "/v1/products/search".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

// The API key must never end up in logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("verify_on_startup", &self.verify_on_startup)
            .field("probe_path", &self.probe_path)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// How the gate treats client-supplied `Accept` / `Accept-Encoding` headers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Replace whatever the client sent.
    #[default]
    Overwrite,
    /// Refuse requests that already carry either header.
    RejectPreset,
}

/// Admission rules for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Exact paths that may be forwarded.
    pub allowed_paths: Vec<String>,

    /// Policy for the normalized outbound headers.
    pub header_policy: HeaderPolicy,
}

impl AdmissionConfig {
    /// Allowed paths as a lookup set.
    pub fn path_set(&self) -> HashSet<String> {
        self.allowed_paths.iter().cloned().collect()
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![
                "/v1/licenses/activate".to_string(),
                "/v1/licenses/validate".to_string(),
                "/v1/licenses/deactivate".to_string(),
            ],
            header_policy: HeaderPolicy::Overwrite,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per client within one window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Entries idle for longer than this are swept.
    pub stale_after_secs: u64,

    /// Interval between sweeps.
    pub sweep_interval_secs: u64,

    /// Key clients on `X-Forwarded-For` when present.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            stale_after_secs: 300,
            sweep_interval_secs: 60,
            trust_forwarded_for: true,
        }
    }
}

/// Ed25519 signing key locations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SigningConfig {
    /// Raw 32-byte public key.
    pub public_key_path: PathBuf,

    /// Raw 64-byte private key (seed followed by public key).
    pub private_key_path: PathBuf,
}

impl SigningConfig {
    /// Standard layout below a data directory.
    pub fn under(data_dir: &Path) -> Self {
        let dir = data_dir.join("signing_keys");
        Self {
            public_key_path: dir.join("signing_public.key"),
            private_key_path: dir.join("signing_private.key"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
