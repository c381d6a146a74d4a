//! Backend plugin subsystem.
//!
//! # Data Flow
//! ```text
//! "DB": { "<name>": { "type": "<kind>", ... } }
//!     → BackendRegistry::create (lookup factory by kind)
//!     → Arc<dyn Database> stored in the compiled ApiConfig
//!
//! Per request:
//!     Database::connection()
//!     → Connection::prepare(query)
//!     → Connection::bind / bind_named (once per parameter)
//!     → Connection::execute() → rows
//!     → Connection::close()
//! ```
//!
//! # Design Decisions
//! - Registry is an explicit value populated at startup, not a global
//! - A `Database` lives as long as its compiled configuration; a
//!   `Connection` is owned by exactly one request
//! - Bind values and result columns are JSON scalars only
//! - Backends with shared mutable state (htpasswd) do their own locking

pub mod htpasswd;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A result row: column name → scalar JSON value.
pub type Row = Map<String, Value>;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No factory is registered for the declared `type`.
    #[error("database type is not supported: {0}")]
    UnknownType(String),

    /// The backend's configuration entry is unusable.
    #[error("invalid database configuration: {0}")]
    Config(String),

    /// The query text was rejected.
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// A value could not be bound.
    #[error("bind failed: {0}")]
    Bind(String),

    /// Execution failed.
    #[error("execute failed: {0}")]
    Execute(String),

    /// bind/execute called before prepare.
    #[error("no query has been prepared")]
    NotPrepared,

    /// The connection was already closed.
    #[error("connection is closed")]
    Closed,

    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A named storage engine instance, built once per configuration.
#[async_trait]
pub trait Database: Send + Sync + fmt::Debug {
    /// Registered type name of this backend.
    fn kind(&self) -> &'static str;

    /// Open a request-scoped connection.
    async fn connection(&self) -> BackendResult<Box<dyn Connection>>;
}

/// A request-scoped, stateful handle.
#[async_trait]
pub trait Connection: Send {
    /// Prepare the query text; fails if the backend cannot make sense of it.
    async fn prepare(&mut self, query: &str) -> BackendResult<()>;

    /// Bind to the first unbound positional slot.
    fn bind(&mut self, value: &Value) -> BackendResult<()>;

    /// Bind by parameter name.
    fn bind_named(&mut self, name: &str, value: &Value) -> BackendResult<()>;

    /// Run the prepared query. Non row-producing backends return no rows.
    async fn execute(&mut self) -> BackendResult<Vec<Row>>;

    /// Release backend resources. Calling it twice is a no-op.
    async fn close(&mut self) -> BackendResult<()>;
}

/// Rejects arrays and objects, which no backend can bind.
pub fn ensure_scalar(value: &Value) -> BackendResult<()> {
    match value {
        Value::Array(_) => Err(BackendError::Bind("cannot bind a JSON array".to_string())),
        Value::Object(_) => Err(BackendError::Bind("cannot bind a JSON object".to_string())),
        _ => Ok(()),
    }
}

/// Constructor for a backend kind: `(database name, config entry) → Database`.
pub type DatabaseFactory =
    Arc<dyn Fn(&str, &Map<String, Value>) -> BackendResult<Arc<dyn Database>> + Send + Sync>;

/// Maps backend type names to their factories.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, DatabaseFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the bundled `sqlite` and `htpasswd` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sqlite", sqlite::factory());
        registry.register("htpasswd", htpasswd::factory());
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Map<String, Value>) -> BackendResult<Arc<dyn Database>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Build the database declared by `entry` under `name`.
    pub fn create(&self, name: &str, entry: &Map<String, Value>) -> BackendResult<Arc<dyn Database>> {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Config(format!("database `{name}` must declare a string `type`")))?;
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| BackendError::UnknownType(kind.to_string()))?;

        tracing::debug!(database = %name, kind = %kind, "Creating database");
        factory(name, entry)
    }

    /// Registered type names.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("BackendRegistry").field("kinds", &kinds).finish()
    }
}

/// Read a required string field from a backend config entry.
pub(crate) fn required_str<'a>(name: &str, entry: &'a Map<String, Value>, field: &str) -> BackendResult<&'a str> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Config(format!("database `{name}` requires a string `{field}`")))
}
