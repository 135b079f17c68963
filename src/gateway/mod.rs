//! Forwarding gateway.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → forward.rs (rewrite destination, inject credential, relay)
//!     → UpstreamResponse (status, headers, unread body)
//!     → response.rs (buffer body, sign, reassemble)
//!     → Client response
//! ```

pub mod forward;
pub mod response;

pub use forward::{ForwardBody, ForwardRequest, Gateway, GatewayError, UpstreamResponse};
pub use response::{sign_response, BodyReadError};
