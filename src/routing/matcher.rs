//! Mount matching.
//!
//! # Responsibilities
//! - Pick the configuration source serving a request path
//! - Strip the mount prefix before the path reaches the route trie
//!
//! # Design Decisions
//! - Prefix matching is case-sensitive and segment-aligned
//!   (`/api` matches `/api` and `/api/x`, never `/apix`)
//! - Longest prefix wins
//! - No regex to guarantee O(n) matching

use std::path::PathBuf;

use crate::config::MountConfig;

/// Matches the request path prefix on whole segments.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. Trailing slashes are ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Return the remainder of `path` after the prefix, or `None`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(&self.prefix)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.prefix.len()
    }
}

/// A mounted configuration source.
#[derive(Debug, Clone)]
pub struct Mount {
    matcher: PathPrefixMatcher,
    /// Configuration document served under this prefix.
    pub source: PathBuf,
}

/// The selected mount for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct MountMatch<'a> {
    pub source: &'a PathBuf,
    /// Request path with the mount prefix removed.
    pub path: &'a str,
}

/// Immutable mount table, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    /// Build the table from configuration.
    pub fn from_config(configs: &[MountConfig]) -> Self {
        let mut mounts: Vec<Mount> = configs
            .iter()
            .map(|config| Mount {
                matcher: PathPrefixMatcher::new(config.prefix.clone()),
                source: PathBuf::from(&config.config),
            })
            .collect();
        // Longest prefix first; stable sort keeps declaration order for ties
        mounts.sort_by(|a, b| b.matcher.len().cmp(&a.matcher.len()));
        Self { mounts }
    }

    /// Find the mount serving `path`.
    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<MountMatch<'a>> {
        self.mounts.iter().find_map(|mount| {
            mount.matcher.strip(path).map(|rest| MountMatch {
                source: &mount.source,
                path: rest,
            })
        })
    }

    /// All mounted sources, in match order.
    pub fn sources(&self) -> impl Iterator<Item = &PathBuf> {
        self.mounts.iter().map(|mount| &mount.source)
    }
}
