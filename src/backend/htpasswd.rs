//! htpasswd-style password file backend.
//!
//! ```json
//! "users": { "type": "htpasswd", "filename": "etc/passwd", "algorithm": "sha256" }
//! ```
//!
//! The "query" of an endpoint is a verb: `insert`, `update` or `delete`.
//! Parameters are the username (slot 0 or `username`) and the password
//! (slot 1 or `password`). Execution never produces rows.
//!
//! Every database naming the same file shares one [`PasswordFile`]: one lock
//! and one cached user table. Each mutation re-stats the file, reloads it when
//! another writer touched it, applies the change, and replaces the file with a
//! rewritten sibling. File work runs on the blocking pool.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{required_str, BackendError, BackendResult, Connection, Database, Row};

/// Factory registered under `htpasswd`.
///
/// Instances created by the same factory share password files by absolute path.
pub fn factory() -> impl Fn(&str, &Map<String, Value>) -> BackendResult<Arc<dyn Database>> + Send + Sync + 'static {
    let files = PasswordFiles::default();
    move |name: &str, entry: &Map<String, Value>| {
        let database = HtpasswdDatabase::from_config(&files, name, entry)?;
        Ok(Arc::new(database) as Arc<dyn Database>)
    }
}

/// How passwords are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Md5,
    Plain,
}

impl HashAlgorithm {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "sha256" => Some(Self::Sha256),
            "md5" => Some(Self::Md5),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn hash(&self, password: &str) -> String {
        match self {
            Self::Sha256 => format!("{{SHA256}}{}", hex::encode(Sha256::digest(password.as_bytes()))),
            Self::Md5 => hex::encode(md5::Md5::digest(password.as_bytes())),
            Self::Plain => password.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct UserTable {
    users: BTreeMap<String, String>,
    /// mtime of the file when it was last read or written.
    loaded: Option<SystemTime>,
}

/// A password file and its cached contents.
pub struct PasswordFile {
    path: PathBuf,
    table: ReentrantMutex<RefCell<UserTable>>,
}

impl PasswordFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            table: ReentrantMutex::new(RefCell::new(UserTable::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the table if the file changed since the last load.
    pub fn sync(&self) -> BackendResult<()> {
        let guard = self.table.lock();
        let modified = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.modified()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut table = guard.borrow_mut();
        let stale = match (modified, table.loaded) {
            (None, _) => {
                table.users.clear();
                table.loaded = None;
                return Ok(());
            }
            (Some(_), None) => true,
            (Some(file), Some(loaded)) => file > loaded,
        };
        if !stale {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)?;
        table.users = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match line.split_once(':') {
                Some((user, hash)) => (user.to_string(), hash.to_string()),
                None => (line.to_string(), String::new()),
            })
            .collect();
        table.loaded = modified;
        tracing::debug!(path = ?self.path, users = table.users.len(), "Loaded password file");
        Ok(())
    }

    fn flush(&self) -> BackendResult<()> {
        let guard = self.table.lock();
        let mut table = guard.borrow_mut();

        let result = (|| -> io::Result<SystemTime> {
            let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
            let mut staged = tempfile::NamedTempFile::new_in(dir)?;
            for (user, hash) in &table.users {
                writeln!(staged, "{user}:{hash}")?;
            }
            staged.as_file_mut().sync_all()?;
            let file = staged.persist(&self.path)?;
            file.metadata()?.modified()
        })();

        match result {
            Ok(modified) => {
                table.loaded = Some(modified);
                Ok(())
            }
            Err(e) => {
                // force a reload on the next operation
                table.loaded = None;
                Err(e.into())
            }
        }
    }

    fn mutate<F>(&self, change: F) -> BackendResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> BackendResult<()>,
    {
        let guard = self.table.lock();
        self.sync()?;
        change(&mut guard.borrow_mut().users)?;
        self.flush()
    }

    pub fn insert(&self, username: &str, hash: String) -> BackendResult<()> {
        self.mutate(|users| {
            if users.contains_key(username) {
                return Err(BackendError::Execute(format!("user already exists: {username}")));
            }
            users.insert(username.to_string(), hash);
            Ok(())
        })
    }

    pub fn update(&self, username: &str, hash: String) -> BackendResult<()> {
        self.mutate(|users| match users.get_mut(username) {
            Some(existing) => {
                *existing = hash;
                Ok(())
            }
            None => Err(BackendError::Execute(format!("invalid username: {username}"))),
        })
    }

    pub fn delete(&self, username: &str) -> BackendResult<()> {
        self.mutate(|users| match users.remove(username) {
            Some(_) => Ok(()),
            None => Err(BackendError::Execute(format!("invalid username: {username}"))),
        })
    }

    /// Stored hash for `username`, after syncing with the file.
    pub fn get(&self, username: &str) -> BackendResult<Option<String>> {
        let guard = self.table.lock();
        self.sync()?;
        let table = guard.borrow();
        Ok(table.users.get(username).cloned())
    }
}

impl fmt::Debug for PasswordFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordFile").field("path", &self.path).finish()
    }
}

/// Password files shared between htpasswd databases, keyed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct PasswordFiles {
    files: Arc<DashMap<PathBuf, Arc<PasswordFile>>>,
}

impl PasswordFiles {
    pub fn open(&self, path: &Path) -> BackendResult<Arc<PasswordFile>> {
        let path = std::path::absolute(path)?;
        let file = self
            .files
            .entry(path.clone())
            .or_insert_with(|| Arc::new(PasswordFile::new(path)))
            .clone();
        Ok(file)
    }
}

/// An htpasswd database.
#[derive(Debug)]
pub struct HtpasswdDatabase {
    file: Arc<PasswordFile>,
    algorithm: HashAlgorithm,
}

impl HtpasswdDatabase {
    pub fn from_config(files: &PasswordFiles, name: &str, entry: &Map<String, Value>) -> BackendResult<Self> {
        let filename = required_str(name, entry, "filename")?;
        let algorithm = match entry.get("algorithm") {
            None => HashAlgorithm::default(),
            Some(value) => value.as_str().and_then(HashAlgorithm::parse).ok_or_else(|| {
                BackendError::Config(format!(
                    "database `{name}`: `algorithm` must be one of sha256, md5, plain"
                ))
            })?,
        };

        Ok(Self {
            file: files.open(Path::new(filename))?,
            algorithm,
        })
    }

    pub fn file(&self) -> &Arc<PasswordFile> {
        &self.file
    }
}

/// Run `op` against `file` on the blocking pool.
async fn blocking<T, F>(file: &Arc<PasswordFile>, op: F) -> BackendResult<T>
where
    F: FnOnce(&PasswordFile) -> BackendResult<T> + Send + 'static,
    T: Send + 'static,
{
    let file = file.clone();
    tokio::task::spawn_blocking(move || op(&file))
        .await
        .map_err(|e| BackendError::Execute(format!("password file task failed: {e}")))?
}

#[async_trait]
impl Database for HtpasswdDatabase {
    fn kind(&self) -> &'static str {
        "htpasswd"
    }

    async fn connection(&self) -> BackendResult<Box<dyn Connection>> {
        blocking(&self.file, PasswordFile::sync).await?;
        Ok(Box::new(HtpasswdConnection {
            file: self.file.clone(),
            algorithm: self.algorithm,
            verb: None,
            username: None,
            password: None,
            next_slot: 0,
            closed: false,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Insert,
    Update,
    Delete,
}

const USERNAME_SLOT: usize = 0;
const PASSWORD_SLOT: usize = 1;

/// A request-scoped htpasswd operation.
#[derive(Debug)]
pub struct HtpasswdConnection {
    file: Arc<PasswordFile>,
    algorithm: HashAlgorithm,
    verb: Option<Verb>,
    username: Option<String>,
    password: Option<String>,
    next_slot: usize,
    closed: bool,
}

impl HtpasswdConnection {
    fn bind_slot(&mut self, slot: usize, value: &Value) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        if self.verb.is_none() {
            return Err(BackendError::NotPrepared);
        }
        let value = value
            .as_str()
            .ok_or_else(|| BackendError::Bind("htpasswd arguments must be strings".to_string()))?
            .to_string();
        match slot {
            USERNAME_SLOT => self.username = Some(value),
            PASSWORD_SLOT => self.password = Some(value),
            other => return Err(BackendError::Bind(format!("invalid parameter index: {other}"))),
        }
        Ok(())
    }

    fn username(&self) -> BackendResult<&str> {
        self.username
            .as_deref()
            .ok_or_else(|| BackendError::Execute("username is not bound".to_string()))
    }

    fn hashed_password(&self) -> BackendResult<String> {
        self.password
            .as_deref()
            .map(|password| self.algorithm.hash(password))
            .ok_or_else(|| BackendError::Execute("password is not bound".to_string()))
    }
}

#[async_trait]
impl Connection for HtpasswdConnection {
    async fn prepare(&mut self, query: &str) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        let verb = match query.trim() {
            "insert" => Verb::Insert,
            "update" => Verb::Update,
            "delete" => Verb::Delete,
            other => return Err(BackendError::Prepare(format!("invalid htpasswd query: {other}"))),
        };
        self.verb = Some(verb);
        self.username = None;
        self.password = None;
        self.next_slot = 0;
        Ok(())
    }

    fn bind(&mut self, value: &Value) -> BackendResult<()> {
        self.bind_slot(self.next_slot, value)?;
        self.next_slot += 1;
        Ok(())
    }

    fn bind_named(&mut self, name: &str, value: &Value) -> BackendResult<()> {
        match name {
            "username" => self.bind_slot(USERNAME_SLOT, value),
            "password" => self.bind_slot(PASSWORD_SLOT, value),
            other => Err(BackendError::Bind(format!("invalid parameter name: {other}"))),
        }
    }

    async fn execute(&mut self) -> BackendResult<Vec<Row>> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        let verb = self.verb.ok_or(BackendError::NotPrepared)?;
        let username = self.username()?.to_string();
        let hash = match verb {
            Verb::Delete => None,
            Verb::Insert | Verb::Update => Some(self.hashed_password()?),
        };

        let user = username.clone();
        blocking(&self.file, move |file| match (verb, hash) {
            (Verb::Insert, Some(hash)) => file.insert(&user, hash),
            (Verb::Update, Some(hash)) => file.update(&user, hash),
            _ => file.delete(&user),
        })
        .await?;
        tracing::info!(path = ?self.file.path(), user = %username, verb = ?verb, "Password file updated");
        Ok(Vec::new())
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        Ok(())
    }
}
