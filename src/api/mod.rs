//! Declarative API configuration.
//!
//! # Data Flow
//! ```text
//! JSON document (file)
//!     → compiler.rs (DB → databases, REST → route trie + RestNodes)
//!     → cache.rs (one compiled ApiConfig per source file)
//!
//! Per request:
//!     ApiConfig::match_target → RestNode + captures
//!     → context.rs (ParamContext, path expressions → bind values)
//! ```

pub mod cache;
pub mod compiler;
pub mod context;
pub mod model;

pub use cache::ConfigCache;
pub use compiler::{ApiConfig, CompileError, DEFAULT_DATABASE};
pub use context::{resolve, ParamContext, ResolveError, ResolveFailure};
pub use model::{Endpoint, QueryBinding, QueryParameter, RestNode, ScalarType};
