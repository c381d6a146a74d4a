//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Detect conflicting or malformed mounts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewaySettings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewaySettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),

    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("at least one mount is required")]
    NoMounts,

    #[error("mount prefix `{0}` must start with `/`")]
    InvalidPrefix(String),

    #[error("mount prefix `{0}` is declared more than once")]
    DuplicatePrefix(String),

    #[error("mount `{0}` has an empty config path")]
    EmptyConfigPath(String),
}

/// Check `settings`, collecting every problem found.
pub fn validate_config(settings: &GatewaySettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(settings.listener.bind_address.clone()));
    }
    if settings.observability.metrics_enabled
        && settings.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            settings.observability.metrics_address.clone(),
        ));
    }
    if settings.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if settings.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if settings.mounts.is_empty() {
        errors.push(ValidationError::NoMounts);
    }
    let mut seen = HashSet::new();
    for mount in &settings.mounts {
        if !mount.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix(mount.prefix.clone()));
        }
        let normalized = mount.prefix.trim_end_matches('/');
        if !seen.insert(normalized.to_string()) {
            errors.push(ValidationError::DuplicatePrefix(mount.prefix.clone()));
        }
        if mount.config.trim().is_empty() {
            errors.push(ValidationError::EmptyConfigPath(mount.prefix.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountConfig;

    fn mount(prefix: &str, config: &str) -> MountConfig {
        MountConfig {
            prefix: prefix.to_string(),
            config: config.to_string(),
        }
    }

    #[test]
    fn test_valid_settings() {
        let mut settings = GatewaySettings::default();
        settings.mounts.push(mount("/", "api.json"));
        assert!(validate_config(&settings).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut settings = GatewaySettings::default();
        settings.listener.bind_address = "nowhere".into();
        settings.timeouts.request_secs = 0;
        settings.security.max_body_size = 0;

        let errors = validate_config(&settings).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidBindAddress("nowhere".into()),
                ValidationError::ZeroTimeout,
                ValidationError::ZeroBodyLimit,
                ValidationError::NoMounts,
            ]
        );
    }

    #[test]
    fn test_mount_errors() {
        let mut settings = GatewaySettings::default();
        settings.mounts = vec![mount("api", "a.json"), mount("/v1", "b.json"), mount("/v1/", " ")];

        let errors = validate_config(&settings).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidPrefix("api".into())));
        assert!(errors.contains(&ValidationError::DuplicatePrefix("/v1/".into())));
        assert!(errors.contains(&ValidationError::EmptyConfigPath("/v1/".into())));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut settings = GatewaySettings::default();
        settings.mounts.push(mount("/", "api.json"));
        settings.observability.metrics_address = "bad".into();
        assert!(validate_config(&settings).is_ok());

        settings.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&settings).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("bad".into())]
        );
    }
}
