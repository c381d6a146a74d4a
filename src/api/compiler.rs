//! Configuration compiler.
//!
//! # Responsibilities
//! - Build every database declared under `DB` through the backend registry
//! - Register every `REST` key in the route trie, in document order
//! - Compile endpoint bodies into [`RestNode`]s
//! - Produce the sanitized rendering served by the `api` special action
//!
//! # Design Decisions
//! - All-or-nothing: the first malformed entry aborts the compile
//! - A `special` key must hold a string; any other value is a compile error
//!   rather than a fall-through to a query endpoint
//! - The compiled [`ApiConfig`] is immutable and shared through `Arc`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::model::{Endpoint, QueryBinding, QueryParameter, RestNode};
use crate::backend::{BackendError, BackendRegistry, Database};
use crate::routing::{split_segments, RouteError, RouteMatch, RouteNode};

/// Database used when an endpoint does not name one.
pub const DEFAULT_DATABASE: &str = "default";

/// Configuration errors. All are fatal to the compile.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration root must be an object")]
    RootNotObject,

    #[error("`{0}` section is missing or not an object")]
    SectionNotObject(&'static str),

    #[error("`{section}` entry `{key}` must be an object")]
    EntryNotObject { section: &'static str, key: String },

    #[error("database `{name}`: {source}")]
    Backend {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("route `{route}` references unknown database `{database}`")]
    UnknownDatabase { route: String, database: String },

    #[error("route `{route}` is missing required field `{field}`")]
    MissingField { route: String, field: &'static str },

    #[error("route `{route}`: `{field}` must be {expected}")]
    InvalidField {
        route: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("route `{route}`: parameter must be a string or an object")]
    InvalidParameter { route: String },

    #[error("route `{route}`: invalid parameter type {found}")]
    InvalidType { route: String, found: String },

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// A compiled configuration document.
#[derive(Debug)]
pub struct ApiConfig {
    debug: bool,
    databases: BTreeMap<String, Arc<dyn Database>>,
    router: RouteNode,
    endpoints: Vec<RestNode>,
    sanitized: Value,
}

impl ApiConfig {
    /// Compile a parsed document.
    pub fn compile(document: Value, registry: &BackendRegistry) -> Result<Self, CompileError> {
        let root = document.as_object().ok_or(CompileError::RootNotObject)?;
        let db_section = section(root, "DB")?;
        let rest_section = section(root, "REST")?;

        let mut databases = BTreeMap::new();
        for (name, entry) in db_section {
            let entry = entry.as_object().ok_or_else(|| CompileError::EntryNotObject {
                section: "DB",
                key: name.clone(),
            })?;
            let database = registry.create(name, entry).map_err(|source| CompileError::Backend {
                name: name.clone(),
                source,
            })?;
            databases.insert(name.clone(), database);
        }

        let mut router = RouteNode::new();
        let mut endpoints = Vec::with_capacity(rest_section.len());
        for (template, entry) in rest_section {
            let entry = entry.as_object().ok_or_else(|| CompileError::EntryNotObject {
                section: "REST",
                key: template.clone(),
            })?;
            router.add_route(&split_segments(template), endpoints.len())?;
            endpoints.push(compile_endpoint(template, entry, &databases)?);
        }

        let debug = root.get("debug").and_then(Value::as_bool).unwrap_or(false);
        let sanitized = sanitize(root, &databases, &endpoints);

        Ok(Self {
            debug,
            databases,
            router,
            endpoints,
            sanitized,
        })
    }

    /// Read, parse and compile the document at `path`.
    pub fn load(path: &Path, registry: &BackendRegistry) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&text)?;
        Self::compile(raw, registry)
    }

    /// Match a `METHOD/path` target.
    pub fn match_target(&self, target: &str) -> Option<(&RestNode, RouteMatch)> {
        self.match_tokens(&split_segments(target))
    }

    /// Match an already tokenized target.
    pub fn match_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Option<(&RestNode, RouteMatch)> {
        let matched = self.router.match_route(tokens)?;
        let node = self.endpoints.get(matched.route_id)?;
        Some((node, matched))
    }

    pub fn database(&self, name: &str) -> Option<&Arc<dyn Database>> {
        self.databases.get(name)
    }

    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Endpoints in registration order; index = route id.
    pub fn endpoints(&self) -> &[RestNode] {
        &self.endpoints
    }

    /// Rendering with backend settings replaced by database names.
    pub fn sanitized(&self) -> &Value {
        &self.sanitized
    }

    /// The document's `"debug"` flag.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

fn section<'a>(root: &'a Map<String, Value>, name: &'static str) -> Result<&'a Map<String, Value>, CompileError> {
    root.get(name)
        .and_then(Value::as_object)
        .ok_or(CompileError::SectionNotObject(name))
}

fn compile_endpoint(
    template: &str,
    entry: &Map<String, Value>,
    databases: &BTreeMap<String, Arc<dyn Database>>,
) -> Result<RestNode, CompileError> {
    let invalid = |field, expected| CompileError::InvalidField {
        route: template.to_string(),
        field,
        expected,
    };

    if let Some(special) = entry.get("special") {
        let name = special.as_str().ok_or_else(|| invalid("special", "a string"))?;
        return Ok(RestNode {
            path: template.to_string(),
            endpoint: Endpoint::Special(name.to_string()),
        });
    }

    let database = match entry.get("database") {
        None => DEFAULT_DATABASE,
        Some(value) => value.as_str().ok_or_else(|| invalid("database", "a string"))?,
    };
    if !databases.contains_key(database) {
        return Err(CompileError::UnknownDatabase {
            route: template.to_string(),
            database: database.to_string(),
        });
    }

    let query = match entry.get("query") {
        Some(Value::String(query)) => query.clone(),
        Some(_) => return Err(invalid("query", "a string")),
        None => {
            return Err(CompileError::MissingField {
                route: template.to_string(),
                field: "query",
            })
        }
    };

    let parameters = match entry.get("params") {
        None => Vec::new(),
        Some(Value::Array(params)) => params
            .iter()
            .map(|param| QueryParameter::compile(template, param))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid("params", "an array")),
    };

    Ok(RestNode {
        path: template.to_string(),
        endpoint: Endpoint::Query(QueryBinding {
            database: database.to_string(),
            query,
            parameters,
        }),
    })
}

fn sanitize(
    root: &Map<String, Value>,
    databases: &BTreeMap<String, Arc<dyn Database>>,
    endpoints: &[RestNode],
) -> Value {
    let mut out = Map::with_capacity(root.len());
    for (key, value) in root {
        let rendered = match key.as_str() {
            "DB" => Value::Object(
                databases
                    .keys()
                    .map(|name| (name.clone(), Value::String(name.clone())))
                    .collect(),
            ),
            "REST" => Value::Object(
                endpoints
                    .iter()
                    .map(|node| (node.path.clone(), node.to_json()))
                    .collect(),
            ),
            _ => value.clone(),
        };
        out.insert(key.clone(), rendered);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, Connection};
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct NullDatabase;

    #[async_trait]
    impl Database for NullDatabase {
        fn kind(&self) -> &'static str {
            "null"
        }

        async fn connection(&self) -> BackendResult<Box<dyn Connection>> {
            Err(BackendError::Closed)
        }
    }

    fn registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register("null", |_: &str, _: &Map<String, Value>| {
            Ok(Arc::new(NullDatabase) as Arc<dyn Database>)
        });
        registry
    }

    fn document() -> Value {
        json!({
            "debug": true,
            "title": "demo",
            "DB": {
                "default": {"type": "null", "password": "hunter2"},
                "audit": {"type": "null"}
            },
            "REST": {
                "GET/users/:id": {"query": "SELECT * FROM users WHERE id = ?", "params": ["path.id"]},
                "POST/audit": {
                    "database": "audit",
                    "query": "INSERT INTO log VALUES (:who)",
                    "params": [{"path": "request.who", "name": ":who", "type": "string"}]
                },
                "GET/api": {"special": "api"}
            }
        })
    }

    #[test]
    fn test_compile_and_match() {
        let config = ApiConfig::compile(document(), &registry()).unwrap();
        assert!(config.debug());
        assert_eq!(config.endpoints().len(), 3);

        let (node, matched) = config.match_target("GET/users/42").unwrap();
        assert_eq!(node.path, "GET/users/:id");
        assert_eq!(matched.captures.get("id"), Some(&json!("42")));

        let Endpoint::Query(binding) = &node.endpoint else {
            panic!("expected query endpoint");
        };
        assert_eq!(binding.database, DEFAULT_DATABASE);
        assert_eq!(binding.parameters, vec![QueryParameter::positional("path.id")]);

        assert!(config.match_target("DELETE/users/42").is_none());
    }

    #[test]
    fn test_routes_keep_document_order() {
        let config = ApiConfig::compile(document(), &registry()).unwrap();
        let paths: Vec<_> = config.endpoints().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["GET/users/:id", "POST/audit", "GET/api"]);
    }

    #[test]
    fn test_sanitized_rendering() {
        let config = ApiConfig::compile(document(), &registry()).unwrap();
        let sanitized = config.sanitized();

        assert_eq!(sanitized["title"], json!("demo"));
        assert_eq!(sanitized["DB"], json!({"default": "default", "audit": "audit"}));
        assert!(!sanitized.to_string().contains("hunter2"));
        assert_eq!(sanitized["REST"]["GET/api"], json!({"special": "api"}));
        assert_eq!(
            sanitized["REST"]["POST/audit"]["params"],
            json!([{"path": "request.who", "name": ":who", "type": "string"}])
        );

        let names: Vec<_> = config.database_names().collect();
        let rendered: Vec<_> = sanitized["DB"].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(names, rendered);
    }

    #[test]
    fn test_structural_errors() {
        let reg = registry();
        assert!(matches!(ApiConfig::compile(json!([]), &reg), Err(CompileError::RootNotObject)));
        assert!(matches!(
            ApiConfig::compile(json!({"REST": {}}), &reg),
            Err(CompileError::SectionNotObject("DB"))
        ));
        assert!(matches!(
            ApiConfig::compile(json!({"DB": {}, "REST": []}), &reg),
            Err(CompileError::SectionNotObject("REST"))
        ));
        assert!(matches!(
            ApiConfig::compile(json!({"DB": {"x": 1}, "REST": {}}), &reg),
            Err(CompileError::EntryNotObject { section: "DB", .. })
        ));
        assert!(matches!(
            ApiConfig::compile(json!({"DB": {}, "REST": {"GET/x": "nope"}}), &reg),
            Err(CompileError::EntryNotObject { section: "REST", .. })
        ));
    }

    #[test]
    fn test_endpoint_errors() {
        let reg = registry();
        let db = json!({"default": {"type": "null"}});

        let err = ApiConfig::compile(json!({"DB": db, "REST": {"GET/x": {"database": "other", "query": "q"}}}), &reg)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownDatabase { database, .. } if database == "other"));

        let err = ApiConfig::compile(json!({"DB": db, "REST": {"GET/x": {"params": []}}}), &reg).unwrap_err();
        assert!(matches!(err, CompileError::MissingField { field: "query", .. }));

        let err = ApiConfig::compile(
            json!({"DB": db, "REST": {"GET/x": {"query": "q", "params": [{"path": "a", "type": "nope"}]}}}),
            &reg,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidType { .. }));

        let err = ApiConfig::compile(json!({"DB": db, "REST": {"GET/x": {"special": 1, "query": "q"}}}), &reg)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidField { field: "special", .. }));
    }

    #[test]
    fn test_unknown_backend_type() {
        let err = ApiConfig::compile(json!({"DB": {"default": {"type": "oracle"}}, "REST": {}}), &registry())
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Backend { source: BackendError::UnknownType(_), .. }
        ));
    }

    #[test]
    fn test_duplicate_route() {
        let err = ApiConfig::compile(
            json!({"DB": {}, "REST": {"GET/a": {"special": "api"}, "GET//a/": {"special": "api"}}}),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Route(RouteError::Duplicate(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ApiConfig::load(Path::new("/nonexistent/api.json"), &registry()).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
