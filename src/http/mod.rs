//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware)
//!     → request.rs (request ID)
//!     → mount lookup (routing::MountTable)
//!     → query.rs (query string, path token decoding)
//!     → RequestOrchestrator
//!     → response.rs (error → status + JSON payload)
//!     → Send to client
//! ```

pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
