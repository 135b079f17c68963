//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (derive client identifier)
//!     → admission.rs
//!         → rate_limit.rs (per-client fixed window)
//!         → method / path allowlist / credential header checks
//!         → headers.rs (normalize Accept, Accept-Encoding)
//!     → Pass to gateway
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any admission check failure
//! - No trust in client input; the upstream credential is server-side only

pub mod admission;
pub mod headers;
pub mod rate_limit;

pub use admission::{AdmissionFilter, Outcome, Rejection};
pub use rate_limit::RateLimiter;
