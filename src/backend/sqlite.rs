//! SQLite backend.
//!
//! ```json
//! "main": { "type": "sqlite", "filename": "data/app.db", "create": false, "max_connections": 4 }
//! ```
//!
//! # Design Decisions
//! - The pool is opened on first use, so compiling a configuration never
//!   touches the database file
//! - Placeholders (`?`, `?NNN`, `:name`, `@name`, `$name`) are numbered the
//!   way SQLite numbers them and rewritten to explicit `?NNN`, so a named bind
//!   lands in the slot SQLite itself would resolve
//! - Unbound slots execute as NULL; binding an undeclared name is ignored

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row as _, Sqlite, TypeInfo, ValueRef};
use tokio::sync::OnceCell;

use super::{ensure_scalar, required_str, BackendError, BackendResult, Connection, Database, Row};

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Factory registered under `sqlite`.
pub fn factory() -> impl Fn(&str, &Map<String, Value>) -> BackendResult<Arc<dyn Database>> + Send + Sync + 'static {
    |name: &str, entry: &Map<String, Value>| {
        let database = SqliteDatabase::from_config(name, entry)?;
        Ok(Arc::new(database) as Arc<dyn Database>)
    }
}

/// A SQLite database file.
#[derive(Debug)]
pub struct SqliteDatabase {
    filename: PathBuf,
    options: SqliteConnectOptions,
    max_connections: u32,
    pool: OnceCell<SqlitePool>,
}

impl SqliteDatabase {
    pub fn from_config(name: &str, entry: &Map<String, Value>) -> BackendResult<Self> {
        let filename = PathBuf::from(required_str(name, entry, "filename")?);
        let create = entry.get("create").and_then(Value::as_bool).unwrap_or(false);
        let max_connections = match entry.get("max_connections") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    BackendError::Config(format!("database `{name}`: `max_connections` must be a positive integer"))
                })?,
        };

        let options = SqliteConnectOptions::new()
            .filename(&filename)
            .create_if_missing(create);

        Ok(Self {
            filename,
            options,
            max_connections,
            pool: OnceCell::new(),
        })
    }

    async fn pool(&self) -> BackendResult<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                tracing::info!(filename = ?self.filename, "Opening sqlite database");
                SqlitePoolOptions::new()
                    .max_connections(self.max_connections)
                    .connect_with(self.options.clone())
                    .await
            })
            .await
            .map_err(BackendError::from)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn connection(&self) -> BackendResult<Box<dyn Connection>> {
        let conn = self.pool().await?.acquire().await?;
        Ok(Box::new(SqliteConnection {
            conn: Some(conn),
            statement: None,
        }))
    }
}

/// A bindable SQLite value.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    fn from_json(value: &Value) -> BackendResult<Self> {
        ensure_scalar(value)?;
        Ok(match value {
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => number_to_sql(n)?,
            Value::String(s) => SqlValue::Text(s.clone()),
            _ => SqlValue::Null,
        })
    }
}

fn number_to_sql(n: &Number) -> BackendResult<SqlValue> {
    if let Some(i) = n.as_i64() {
        Ok(SqlValue::Integer(i))
    } else if n.is_u64() {
        Err(BackendError::Bind(format!("integer {n} does not fit a signed 64-bit column")))
    } else {
        n.as_f64()
            .map(SqlValue::Real)
            .ok_or_else(|| BackendError::Bind(format!("unrepresentable number {n}")))
    }
}

/// A statement after placeholder numbering, plus its bound values.
#[derive(Debug)]
struct PreparedStatement {
    sql: String,
    /// Slot `i` is parameter `?{i + 1}`; named slots keep their prefixed name.
    names: Vec<Option<String>>,
    values: Vec<Option<SqlValue>>,
    cursor: usize,
}

impl PreparedStatement {
    fn new(query: &str) -> Self {
        let (sql, names) = number_parameters(query);
        let values = vec![None; names.len()];
        Self {
            sql,
            names,
            values,
            cursor: 0,
        }
    }

    fn bind_next(&mut self, value: SqlValue) -> BackendResult<()> {
        while self.cursor < self.values.len() && self.values[self.cursor].is_some() {
            self.cursor += 1;
        }
        let slot = self.values.get_mut(self.cursor).ok_or_else(|| {
            BackendError::Bind(format!("statement declares only {} parameter(s)", self.names.len()))
        })?;
        *slot = Some(value);
        self.cursor += 1;
        Ok(())
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        let find = |wanted: &str| self.names.iter().position(|n| n.as_deref() == Some(wanted));
        if name.starts_with([':', '@', '$']) {
            return find(name);
        }
        [':', '@', '$']
            .iter()
            .find_map(|prefix| find(&format!("{prefix}{name}")))
    }
}

/// A pooled SQLite connection driving one statement.
pub struct SqliteConnection {
    conn: Option<PoolConnection<Sqlite>>,
    statement: Option<PreparedStatement>,
}

impl SqliteConnection {
    fn statement_mut(&mut self) -> BackendResult<&mut PreparedStatement> {
        if self.conn.is_none() {
            return Err(BackendError::Closed);
        }
        self.statement.as_mut().ok_or(BackendError::NotPrepared)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn prepare(&mut self, query: &str) -> BackendResult<()> {
        let conn = self.conn.as_mut().ok_or(BackendError::Closed)?;
        let statement = PreparedStatement::new(query);

        (&mut **conn)
            .prepare(statement.sql.as_str())
            .await
            .map_err(|e| BackendError::Prepare(e.to_string()))?;

        tracing::trace!(sql = %statement.sql, parameters = statement.names.len(), "Prepared statement");
        self.statement = Some(statement);
        Ok(())
    }

    fn bind(&mut self, value: &Value) -> BackendResult<()> {
        let value = SqlValue::from_json(value)?;
        self.statement_mut()?.bind_next(value)
    }

    fn bind_named(&mut self, name: &str, value: &Value) -> BackendResult<()> {
        let value = SqlValue::from_json(value)?;
        let statement = self.statement_mut()?;
        match statement.slot_of(name) {
            Some(slot) => statement.values[slot] = Some(value),
            None => tracing::debug!(name = %name, "Statement does not declare parameter, ignoring bind"),
        }
        Ok(())
    }

    async fn execute(&mut self) -> BackendResult<Vec<Row>> {
        let conn = self.conn.as_mut().ok_or(BackendError::Closed)?;
        let statement = self.statement.as_ref().ok_or(BackendError::NotPrepared)?;

        let mut query = sqlx::query(&statement.sql);
        for value in &statement.values {
            query = match value.clone().unwrap_or(SqlValue::Null) {
                SqlValue::Null => query.bind(None::<i64>),
                SqlValue::Integer(i) => query.bind(i),
                SqlValue::Real(r) => query.bind(r),
                SqlValue::Text(s) => query.bind(s),
            };
        }

        let rows = query
            .fetch_all(&mut **conn)
            .await
            .map_err(|e| BackendError::Execute(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.statement = None;
        // Dropping the pooled connection returns it to the pool
        self.conn.take();
        Ok(())
    }
}

fn decode_row(row: &SqliteRow) -> BackendResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(index)?),
                "BLOB" => {
                    return Err(BackendError::Execute(format!(
                        "BLOB column `{}` is not supported",
                        column.name()
                    )))
                }
                _ => Value::from(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Largest `?NNN` index SQLite accepts by default.
const MAX_PARAMETER_INDEX: usize = 32766;

fn is_identifier(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Rewrite every placeholder to explicit `?NNN` form.
///
/// Returns the rewritten SQL and, per slot, the parameter name (`None` for
/// positional slots). Quoted text and comments are copied verbatim.
fn number_parameters(sql: &str) -> (String, Vec<Option<String>>) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots: Vec<Option<String>> = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == close {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(c);
                let mut previous = '\0';
                for next in chars.by_ref() {
                    out.push(next);
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            '?' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                let index = if digits.is_empty() {
                    slots.len() + 1
                } else {
                    match digits.parse::<usize>() {
                        Ok(n) if n > 0 && n <= MAX_PARAMETER_INDEX => n,
                        // leave it for SQLite to reject
                        _ => {
                            out.push('?');
                            out.push_str(&digits);
                            continue;
                        }
                    }
                };
                if slots.len() < index {
                    slots.resize(index, None);
                }
                out.push('?');
                out.push_str(&index.to_string());
            }
            ':' | '@' | '$' if chars.peek().copied().is_some_and(is_identifier) => {
                let mut name = String::from(c);
                while let Some(n) = chars.peek().copied().filter(|n| is_identifier(*n)) {
                    name.push(n);
                    chars.next();
                }
                let index = match slots.iter().position(|s| s.as_deref() == Some(name.as_str())) {
                    Some(existing) => existing + 1,
                    None => {
                        slots.push(Some(name));
                        slots.len()
                    }
                };
                out.push('?');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }

    (out, slots)
}
