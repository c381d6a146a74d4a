//! Compiled configuration cache.
//!
//! Keyed by configuration file path. Entries are never invalidated; a
//! changed document takes effect after a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::compiler::{ApiConfig, CompileError};
use crate::backend::BackendRegistry;
use crate::observability::metrics;

/// One source's compiled configuration, filled on first successful compile.
type Slot = Arc<Mutex<Option<Arc<ApiConfig>>>>;

#[derive(Debug)]
pub struct ConfigCache {
    registry: Arc<BackendRegistry>,
    entries: Mutex<HashMap<PathBuf, Slot>>,
}

impl ConfigCache {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, source: &Path) -> Slot {
        self.entries.lock().entry(source.to_path_buf()).or_default().clone()
    }

    /// Return the cached configuration for `source`, compiling it on first use.
    ///
    /// Only the source's own slot is locked across the compile, so a source is
    /// compiled at most once and lookups of other sources never wait on it.
    pub fn get_or_compile(&self, source: &Path) -> Result<Arc<ApiConfig>, CompileError> {
        let slot = self.slot(source);
        let mut slot = slot.lock();
        if let Some(config) = slot.as_ref() {
            return Ok(config.clone());
        }

        let started = Instant::now();
        match ApiConfig::load(source, &self.registry) {
            Ok(config) => {
                let config = Arc::new(config);
                tracing::info!(
                    source = ?source,
                    databases = config.database_names().count(),
                    routes = config.endpoints().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Compiled configuration"
                );
                metrics::record_compile(true);
                *slot = Some(config.clone());
                Ok(config)
            }
            Err(e) => {
                tracing::error!(source = ?source, error = %e, "Configuration compile failed");
                metrics::record_compile(false);
                Err(e)
            }
        }
    }

    /// Store an already compiled configuration under `source`.
    pub fn insert(&self, source: impl Into<PathBuf>, config: ApiConfig) -> Arc<ApiConfig> {
        let source: PathBuf = source.into();
        let config = Arc::new(config);
        let slot = self.slot(&source);
        *slot.lock() = Some(config.clone());
        config
    }

    /// Number of sources holding a compiled configuration.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.entries.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
