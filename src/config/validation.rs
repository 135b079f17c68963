//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream URL and credential are usable
//! - Validate value ranges (windows > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GateConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream API key is not set")]
    MissingApiKey,

    #[error("upstream base URL {0:?} is invalid: {1}")]
    InvalidUpstreamUrl(String, String),

    #[error("listener bind address {0:?} is invalid")]
    InvalidBindAddress(String),

    #[error("allowed path list is empty")]
    NoAllowedPaths,

    #[error("allowed path {0:?} must start with '/'")]
    RelativeAllowedPath(String),

    #[error("rate limit {0} must be greater than zero")]
    ZeroRateLimit(&'static str),

    #[error("metrics address {0:?} is invalid")]
    InvalidMetricsAddress(String),
}

/// Check a loaded configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::InvalidUpstreamUrl(
                config.upstream.base_url.clone(),
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidUpstreamUrl(
                config.upstream.base_url.clone(),
                "missing host".to_string(),
            ));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUpstreamUrl(
            config.upstream.base_url.clone(),
            e.to_string(),
        )),
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.admission.allowed_paths.is_empty() {
        errors.push(ValidationError::NoAllowedPaths);
    }
    for path in &config.admission.allowed_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativeAllowedPath(path.clone()));
        }
    }

    let limits = &config.rate_limit;
    if limits.max_requests == 0 {
        errors.push(ValidationError::ZeroRateLimit("max_requests"));
    }
    if limits.window_secs == 0 {
        errors.push(ValidationError::ZeroRateLimit("window_secs"));
    }
    if limits.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroRateLimit("sweep_interval_secs"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
