//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use query_gateway::backend::{BackendRegistry, BackendResult, Connection, Database, Row};
use query_gateway::config::{GatewaySettings, MountConfig};
use query_gateway::http::HttpServer;
use query_gateway::lifecycle::Shutdown;

/// A bind observed by the recording backend: `(name, value)`.
pub type Bind = (Option<String>, Value);

/// Backend that records prepares and binds and echoes them as one row.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub queries: Arc<Mutex<Vec<String>>>,
    pub binds: Arc<Mutex<Vec<Bind>>>,
}

impl Recorder {
    /// Register the recorder under `recording` in `registry`.
    pub fn install(&self, registry: &mut BackendRegistry) {
        let recorder = self.clone();
        registry.register("recording", move |_: &str, _: &Map<String, Value>| {
            Ok(Arc::new(recorder.clone()) as Arc<dyn Database>)
        });
    }
}

#[async_trait]
impl Database for Recorder {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn connection(&self) -> BackendResult<Box<dyn Connection>> {
        Ok(Box::new(RecorderConnection {
            recorder: self.clone(),
            binds: Vec::new(),
        }))
    }
}

struct RecorderConnection {
    recorder: Recorder,
    binds: Vec<Bind>,
}

#[async_trait]
impl Connection for RecorderConnection {
    async fn prepare(&mut self, query: &str) -> BackendResult<()> {
        self.recorder.queries.lock().push(query.to_string());
        Ok(())
    }

    fn bind(&mut self, value: &Value) -> BackendResult<()> {
        self.binds.push((None, value.clone()));
        Ok(())
    }

    fn bind_named(&mut self, name: &str, value: &Value) -> BackendResult<()> {
        self.binds.push((Some(name.to_string()), value.clone()));
        Ok(())
    }

    async fn execute(&mut self) -> BackendResult<Vec<Row>> {
        self.recorder.binds.lock().extend(self.binds.iter().cloned());
        let mut row = Row::new();
        row.insert("binds".to_string(), Value::from(self.binds.len()));
        Ok(vec![row])
    }

    async fn close(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Write `contents` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub server_dir: TempDir,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway serving `document` at `/`.
pub async fn start_gateway(document: &str, registry: BackendRegistry) -> TestGateway {
    let server_dir = tempfile::tempdir().unwrap();
    let api = write_file(server_dir.path(), "api.json", document);

    let mut settings = GatewaySettings::default();
    settings.listener.bind_address = "127.0.0.1:0".to_string();
    settings.mounts = vec![MountConfig {
        prefix: "/".to_string(),
        config: api.to_string_lossy().into_owned(),
    }];

    let listener = TcpListener::bind(&settings.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(&settings, Arc::new(registry));
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestGateway {
        addr,
        server_dir,
        shutdown,
    }
}
