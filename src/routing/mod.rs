//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → matcher.rs (mount lookup → configuration source, stripped path)
//!     → split_segments("GET" + path)
//!     → trie.rs (route lookup → route id + captures)
//!     → Return: matched endpoint or NoMatch
//!
//! Route Compilation (per configuration document):
//!     REST keys in document order
//!     → split_segments
//!     → RouteNode::add_route(segments, next id)
//!     → Freeze inside the compiled ApiConfig
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per document, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First registered match wins

pub mod matcher;
pub mod trie;

pub use matcher::{MountMatch, MountTable, PathPrefixMatcher};
pub use trie::{RouteError, RouteId, RouteMatch, RouteNode, Segment};

/// Split a slash-delimited target into non-empty segments.
pub fn split_segments(target: &str) -> Vec<&str> {
    target.split('/').filter(|token| !token.is_empty()).collect()
}
