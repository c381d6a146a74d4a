//! Startup orchestration.
//!
//! Every mounted configuration document is compiled before the listener
//! binds, so a broken document fails the process instead of the first
//! request that touches it.

use crate::api::CompileError;
use crate::orchestrator::RequestOrchestrator;
use crate::routing::MountTable;

/// Compile every mounted source into the orchestrator's cache.
pub fn preload(mounts: &MountTable, orchestrator: &RequestOrchestrator) -> Result<usize, CompileError> {
    let mut compiled = 0;
    for source in mounts.sources() {
        let config = orchestrator.cache().get_or_compile(source)?;
        tracing::info!(
            source = ?source,
            routes = config.endpoints().len(),
            "Configuration ready"
        );
        compiled += 1;
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::config::{MountConfig, ParameterConfig};
    use std::io::Write;
    use std::sync::Arc;

    fn orchestrator() -> RequestOrchestrator {
        RequestOrchestrator::new(Arc::new(BackendRegistry::with_defaults()), ParameterConfig::default())
    }

    #[test]
    fn test_preload_compiles_every_mount() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        write!(a, r#"{{"DB": {{}}, "REST": {{}}}}"#).unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        write!(b, r#"{{"DB": {{}}, "REST": {{"GET/api": {{"special": "api"}}}}}}"#).unwrap();

        let mounts = MountTable::from_config(&[
            MountConfig {
                prefix: "/".into(),
                config: a.path().to_string_lossy().into_owned(),
            },
            MountConfig {
                prefix: "/b".into(),
                config: b.path().to_string_lossy().into_owned(),
            },
        ]);
        let orchestrator = orchestrator();

        assert_eq!(preload(&mounts, &orchestrator).unwrap(), 2);
        assert_eq!(orchestrator.cache().len(), 2);
    }

    #[test]
    fn test_preload_fails_on_bad_document() {
        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"DB": {{"x": {{"type": "oracle"}}}}, "REST": {{}}}}"#).unwrap();
        let mounts = MountTable::from_config(&[MountConfig {
            prefix: "/".into(),
            config: bad.path().to_string_lossy().into_owned(),
        }]);

        assert!(matches!(
            preload(&mounts, &orchestrator()),
            Err(CompileError::Backend { .. })
        ));
    }
}
