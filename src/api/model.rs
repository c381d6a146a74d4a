//! Compiled endpoint descriptors.

use std::fmt;

use serde_json::{json, Map, Value};

use super::compiler::CompileError;

/// Advisory scalar kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int,
    Uint,
    Real,
    String,
    Bool,
}

impl ScalarType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "int" => Some(Self::Int),
            "uint" => Some(Self::Uint),
            "real" => Some(Self::Real),
            "string" => Some(Self::String),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Real => "real",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    /// Dot-delimited expression into the request context.
    pub path: String,
    /// Present: bind by name. Absent: bind positionally.
    pub name: Option<String>,
    pub default: Option<Value>,
    pub scalar_type: Option<ScalarType>,
    /// Carried and rendered, never evaluated.
    pub validation: Option<String>,
}

impl QueryParameter {
    /// Parameter reading `path`, bound positionally.
    pub fn positional(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            default: None,
            scalar_type: None,
            validation: None,
        }
    }

    /// Compile one `params` entry of `route`.
    pub fn compile(route: &str, value: &Value) -> Result<Self, CompileError> {
        let entry = match value {
            Value::String(path) => return Ok(Self::positional(path.as_str())),
            Value::Object(entry) => entry,
            _ => {
                return Err(CompileError::InvalidParameter {
                    route: route.to_string(),
                })
            }
        };

        let path = match entry.get("path") {
            Some(Value::String(path)) => path.clone(),
            Some(_) => return Err(invalid_field(route, "path", "a string")),
            None => {
                return Err(CompileError::MissingField {
                    route: route.to_string(),
                    field: "params[].path",
                })
            }
        };

        let name = optional_string(route, entry, "name")?;
        let validation = optional_string(route, entry, "validation")?;
        let scalar_type = match entry.get("type") {
            None => None,
            Some(found) => Some(found.as_str().and_then(ScalarType::parse).ok_or_else(|| {
                CompileError::InvalidType {
                    route: route.to_string(),
                    found: found.to_string(),
                }
            })?),
        };

        Ok(Self {
            path,
            name,
            default: entry.get("default").cloned(),
            scalar_type,
            validation,
        })
    }

    /// Sanitized rendering.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("path".to_string(), Value::String(self.path.clone()));
        if let Some(name) = &self.name {
            out.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(scalar_type) = &self.scalar_type {
            out.insert("type".to_string(), Value::String(scalar_type.to_string()));
        }
        if let Some(default) = &self.default {
            out.insert("default".to_string(), default.clone());
        }
        if let Some(validation) = &self.validation {
            out.insert("validation".to_string(), Value::String(validation.clone()));
        }
        Value::Object(out)
    }
}

fn invalid_field(route: &str, field: &'static str, expected: &'static str) -> CompileError {
    CompileError::InvalidField {
        route: route.to_string(),
        field,
        expected,
    }
}

fn optional_string(route: &str, entry: &Map<String, Value>, field: &'static str) -> Result<Option<String>, CompileError> {
    match entry.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid_field(route, field, "a string")),
    }
}

/// A backend query bound to an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBinding {
    /// Name of the database in the compiled `DB` map.
    pub database: String,
    pub query: String,
    pub parameters: Vec<QueryParameter>,
}

/// What an endpoint does.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Meta endpoint, dispatched without touching a backend.
    Special(String),
    Query(QueryBinding),
}

/// One compiled REST endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RestNode {
    /// Route template as written in the document.
    pub path: String,
    pub endpoint: Endpoint,
}

impl RestNode {
    pub fn to_json(&self) -> Value {
        match &self.endpoint {
            Endpoint::Special(name) => json!({ "special": name }),
            Endpoint::Query(binding) => json!({
                "database": binding.database,
                "query": binding.query,
                "params": binding.parameters.iter().map(QueryParameter::to_json).collect::<Vec<_>>(),
            }),
        }
    }
}
