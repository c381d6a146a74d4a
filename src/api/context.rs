//! Parameter context and path evaluation.
//!
//! A parameter declares a dot-delimited path (`path.id`, `request.user.name`)
//! that is walked through the per-request context object:
//!
//! ```text
//! {
//!   "conf":    sanitized configuration document,
//!   "path":    captured route variables,
//!   "request": parsed request body ([] when empty),
//!   "query":   decoded query string
//! }
//! ```
//!
//! Evaluation is pure and performs no coercion: the value found is handed to
//! the bind step with its JSON type intact.
//!
//! Only a missing key is a [`ResolveFailure::MissingKey`]. A key that is
//! present with an explicit `null` resolves to `null`, which binds as SQL
//! NULL and never triggers the parameter's default.

use serde_json::{Map, Value};

/// Why a path expression could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveFailure {
    #[error("parent value is not an object")]
    NotAnObject,
    #[error("key not found")]
    MissingKey,
}

/// A path expression failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve `{expression}` at segment {segment}: {reason}")]
pub struct ResolveError {
    /// The full expression as declared.
    pub expression: String,
    /// Zero-based index of the failing segment.
    pub segment: usize,
    pub reason: ResolveFailure,
}

/// Walk `expression` through `root`.
pub fn resolve<'a>(root: &'a Value, expression: &str) -> Result<&'a Value, ResolveError> {
    let mut node = root;
    for (segment, key) in expression.split('.').filter(|key| !key.is_empty()).enumerate() {
        let fail = |reason| ResolveError {
            expression: expression.to_string(),
            segment,
            reason,
        };
        let object = node.as_object().ok_or_else(|| fail(ResolveFailure::NotAnObject))?;
        node = object.get(key).ok_or_else(|| fail(ResolveFailure::MissingKey))?;
    }
    Ok(node)
}

/// The per-request evaluation context.
#[derive(Debug, Clone)]
pub struct ParamContext {
    root: Value,
}

impl ParamContext {
    pub fn new(conf: Value, path: Map<String, Value>, request: Value, query: Map<String, Value>) -> Self {
        let mut root = Map::with_capacity(4);
        root.insert("conf".to_string(), conf);
        root.insert("path".to_string(), Value::Object(path));
        root.insert("request".to_string(), request);
        root.insert("query".to_string(), Value::Object(query));
        Self {
            root: Value::Object(root),
        }
    }

    pub fn resolve(&self, expression: &str) -> Result<&Value, ResolveError> {
        resolve(&self.root, expression)
    }
}
