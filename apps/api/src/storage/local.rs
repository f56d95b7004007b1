//! Account-scoped local medium: one JSON file per key inside a namespace directory.
//!
//! Every operation fails soft. Errors are logged and reported as `None` / `false`,
//! never raised, so a corrupt or unwritable medium degrades to an empty view.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::error;

const PROBE_KEY: &str = "__storage_test__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Wins,
    Reflections,
    Preferences,
    Profile,
}

impl StorageKey {
    pub const ALL: [StorageKey; 4] = [
        StorageKey::Wins,
        StorageKey::Reflections,
        StorageKey::Preferences,
        StorageKey::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Wins => "impactlog-wins",
            StorageKey::Reflections => "impactlog-reflections",
            StorageKey::Preferences => "impactlog-preferences",
            StorageKey::Profile => "impactlog-profile",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Namespace directory for one account under `base`.
    pub fn for_account(base: &Path, uid: &str) -> Self {
        let namespace: String = uid
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self::new(base.join(namespace))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Reads and deserializes `key`. `None` when absent, unreadable or corrupt.
    pub fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let path = self.path_for(key.as_str());
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                error!("Failed to get item from storage: {}: {e}", key.as_str());
                return None;
            }
        };
        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Failed to parse item from storage: {}: {e}", key.as_str());
                None
            }
        }
    }

    /// Serializes `value` and replaces `key` atomically. `false` on any failure.
    pub fn set<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> bool {
        match self.write(key.as_str(), value) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to set item in storage: {}: {e:#}", key.as_str());
                false
            }
        }
    }

    pub fn remove(&self, key: StorageKey) -> bool {
        match self.delete(key.as_str()) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to remove item from storage: {}: {e:#}", key.as_str());
                false
            }
        }
    }

    /// Removes every ImpactLog key in this namespace.
    pub fn clear_all(&self) -> bool {
        StorageKey::ALL
            .iter()
            .map(|key| self.remove(*key))
            .fold(true, |ok, removed| ok && removed)
    }

    /// Probes writability with a throwaway write/delete cycle.
    pub fn is_available(&self) -> bool {
        self.write(PROBE_KEY, PROBE_KEY)
            .and_then(|()| self.delete(PROBE_KEY))
            .is_ok()
    }

    fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        let body = serde_json::to_vec(value).context("serializing value")?;
        let mut tmp = NamedTempFile::new_in(&self.root).context("creating temp file")?;
        tmp.write_all(&body).context("writing temp file")?;
        tmp.persist(self.path_for(name))
            .with_context(|| format!("replacing {name}"))?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {name}")),
        }
    }
}
