//! Response signing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     keys.rs (generate or load key pair from the data directory)
//!     → Ed25519Signer (read-only, shared via Arc)
//!
//! Per response:
//!     gateway::response → Signer::sign(body) → x-api-signature header
//! ```

pub mod keys;
pub mod signer;

pub use keys::{prepare_signing_keys, KeyError};
pub use signer::{verify_signature, Ed25519Signer, Signer, SigningError};
