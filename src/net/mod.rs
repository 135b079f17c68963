//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (rustls handshake with the operator-supplied certificate)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Certificate and key are PEM files provided by the operator
//! - The certificate fingerprint is logged at startup for pinning clients

pub mod tls;
