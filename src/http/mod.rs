//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → server.rs (Axum setup, single catch-all route)
//!     → request.rs (request ID)
//!     → security::admission (reject early)
//!     → gateway::forward (relay upstream)
//!     → gateway::response (buffer, sign)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
