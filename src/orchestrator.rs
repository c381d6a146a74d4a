//! Request orchestration.
//!
//! # Data Flow
//! ```text
//! GatewayRequest (source, method, path, query, body)
//!     → ConfigCache::get_or_compile(source)
//!     → route match on METHOD + decoded path tokens
//!     → ParamContext { conf, path, request, query }
//!     → special action, or:
//!         connection → prepare → bind (declaration order) → execute → close
//!     → JSON value (rows array, or the sanitized configuration)
//! ```
//!
//! Every failure is returned as a [`RequestError`]; nothing escapes the
//! request that caused it.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::api::{ApiConfig, CompileError, ConfigCache, Endpoint, ParamContext, QueryBinding, ResolveError, ResolveFailure};
use crate::backend::{BackendError, BackendRegistry, Connection, Row};
use crate::config::ParameterConfig;
use crate::http::query::{parse_query_string, percent_decode, QueryStringError};
use crate::observability::metrics;
use crate::routing::split_segments;

/// Special action rendering the sanitized configuration.
pub const API_ACTION: &str = "api";

/// A transport request, already routed to its configuration source.
#[derive(Debug, Clone, Copy)]
pub struct GatewayRequest<'a> {
    pub source: &'a Path,
    pub method: &'a str,
    /// Path relative to the mount, still percent-encoded.
    pub path: &'a str,
    /// Raw query string, without `?`.
    pub query: &'a str,
    pub body: &'a [u8],
}

/// Per-request failures.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("configuration error: {0}")]
    Config(#[from] CompileError),

    #[error("no route matches {0}")]
    NotFound(String),

    #[error("unknown special action `{0}`")]
    UnknownAction(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("malformed request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("malformed query string: {0}")]
    QueryString(#[from] QueryStringError),

    #[error("database `{database}`: {source}")]
    Backend {
        database: String,
        #[source]
        source: BackendError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Stable category name used in error payloads.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::NotFound(_) => "not_found",
            Self::UnknownAction(_) => "unknown_action",
            Self::Resolve(_) => "resolve",
            Self::Body(_) => "body",
            Self::QueryString(_) => "query_string",
            Self::Backend { .. } => "backend",
            Self::Internal(_) => "internal",
        }
    }
}

/// Drives one request from route match to result rows.
#[derive(Debug)]
pub struct RequestOrchestrator {
    cache: ConfigCache,
    parameters: ParameterConfig,
}

impl RequestOrchestrator {
    pub fn new(registry: Arc<BackendRegistry>, parameters: ParameterConfig) -> Self {
        Self {
            cache: ConfigCache::new(registry),
            parameters,
        }
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    pub async fn process(&self, request: GatewayRequest<'_>) -> Result<Value, RequestError> {
        let config = self.cache.get_or_compile(request.source)?;

        let mut tokens = Vec::with_capacity(8);
        tokens.push(request.method.to_string());
        for token in split_segments(request.path) {
            tokens.push(percent_decode(token)?);
        }

        let (node, matched) = config
            .match_tokens(&tokens)
            .ok_or_else(|| RequestError::NotFound(format!("{} {}", request.method, request.path)))?;
        tracing::debug!(route = %node.path, "Matched route");

        let body = parse_body(request.body)?;
        let query = parse_query_string(request.query)?;
        let context = ParamContext::new(config.sanitized().clone(), matched.captures, body, query);

        match &node.endpoint {
            Endpoint::Special(action) if action == API_ACTION => Ok(config.sanitized().clone()),
            Endpoint::Special(action) => Err(RequestError::UnknownAction(action.clone())),
            Endpoint::Query(binding) => {
                let rows = self.run_query(&config, binding, &context).await?;
                if config.debug() {
                    tracing::info!(route = %node.path, rows = ?rows, "Query result");
                }
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
        }
    }

    async fn run_query(
        &self,
        config: &ApiConfig,
        binding: &QueryBinding,
        context: &ParamContext,
    ) -> Result<Vec<Row>, RequestError> {
        let database = config.database(&binding.database).ok_or_else(|| {
            RequestError::Internal(format!("database `{}` missing from compiled configuration", binding.database))
        })?;
        let backend_error = |source: BackendError| {
            metrics::record_backend_error(database.kind());
            tracing::error!(database = %binding.database, error = %source, "Backend failure");
            RequestError::Backend {
                database: binding.database.clone(),
                source,
            }
        };

        let mut conn = database.connection().await.map_err(backend_error)?;
        let result = self.execute(conn.as_mut(), binding, context).await;
        if let Err(e) = conn.close().await {
            tracing::warn!(database = %binding.database, error = %e, "Failed to close connection");
        }

        match result {
            Ok(rows) => {
                tracing::debug!(database = %binding.database, rows = rows.len(), "Query executed");
                Ok(rows)
            }
            Err(Step::Resolve(e)) => Err(e.into()),
            Err(Step::Backend(e)) => Err(backend_error(e)),
        }
    }

    async fn execute(
        &self,
        conn: &mut dyn Connection,
        binding: &QueryBinding,
        context: &ParamContext,
    ) -> Result<Vec<Row>, Step> {
        conn.prepare(&binding.query).await?;
        for parameter in &binding.parameters {
            let value = match context.resolve(&parameter.path) {
                Ok(value) => value,
                Err(e) => match (&parameter.default, e.reason) {
                    (Some(default), ResolveFailure::MissingKey) if self.parameters.apply_defaults => default,
                    _ => return Err(Step::Resolve(e)),
                },
            };
            match &parameter.name {
                Some(name) => conn.bind_named(name, value)?,
                None => conn.bind(value)?,
            }
        }
        Ok(conn.execute().await?)
    }
}

/// Where a query run failed.
enum Step {
    Resolve(ResolveError),
    Backend(BackendError),
}

impl From<BackendError> for Step {
    fn from(e: BackendError) -> Self {
        Step::Backend(e)
    }
}

fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Array(Vec::new()));
    }
    serde_json::from_slice(body)
}
