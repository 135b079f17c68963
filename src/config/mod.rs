//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → handed by value / Arc to each subsystem constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdmissionConfig, GateConfig, HeaderPolicy, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, SigningConfig, TlsConfig, UpstreamConfig,
};
pub use validation::ValidationError;
