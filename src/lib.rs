//! Declarative query gateway library.
//!
//! A JSON document declares databases and REST endpoints; each endpoint
//! binds request values to a backend query. See [`orchestrator`] for the
//! request path and [`api`] for the document format.

pub mod api;
pub mod backend;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod routing;

pub use api::{ApiConfig, ConfigCache};
pub use backend::{BackendRegistry, Connection, Database};
pub use config::schema::GatewaySettings;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestrator::{GatewayRequest, RequestError, RequestOrchestrator};
