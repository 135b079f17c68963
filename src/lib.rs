//! License gate library.
//!
//! TLS-terminating reverse proxy that admits a fixed set of license API
//! calls, forwards them with a server-held credential and signs the
//! upstream response bodies with Ed25519.

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod signing;

pub use config::schema::GateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
