//! Crate-wide configuration surface, mirroring the teacher's
//! `cache::config::CacheConfig` plain-struct-plus-`Default` shape,
//! extended with a small builder and TOML round-trip since this
//! configuration is meant to be read from a file on disk.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptionKey;
use crate::errors::{MinileafError, Result};

const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 30_000;
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 60_000;
const DEFAULT_WAL_MAX_BYTES_BEFORE_SNAPSHOT: u64 = 8 * 1024 * 1024;
const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Raw 32-byte AEAD key; `None` disables encryption at rest.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub encryption_key: Option<[u8; crypto::KEY_LEN]>,
    pub autosave_interval_ms: u64,
    pub snapshot_interval_ms: u64,
    pub wal_max_bytes_before_snapshot: u64,
    pub memory_only: bool,
    /// `Some(n)` selects the LRU+log engine with `n` documents cached in
    /// RAM; `None` selects the WAL+snapshot engine.
    #[serde(default)]
    pub cache_size: Option<usize>,
    pub sync_on_write: bool,
    pub max_document_size: usize,
    pub background_index_build: bool,
}

use crate::crypto;

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            encryption_key: None,
            autosave_interval_ms: DEFAULT_AUTOSAVE_INTERVAL_MS,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            wal_max_bytes_before_snapshot: DEFAULT_WAL_MAX_BYTES_BEFORE_SNAPSHOT,
            memory_only: false,
            cache_size: None,
            sync_on_write: true,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            background_index_build: false,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_encryption_key(mut self, key: &EncryptionKey) -> Self {
        self.encryption_key = Some(*key.as_bytes());
        self
    }

    #[must_use]
    pub const fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = Some(cache_size);
        self
    }

    #[must_use]
    pub const fn with_memory_only(mut self, memory_only: bool) -> Self {
        self.memory_only = memory_only;
        self
    }

    #[must_use]
    pub const fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    #[must_use]
    pub const fn with_max_document_size(mut self, max_document_size: usize) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    #[must_use]
    pub fn encryption_key(&self) -> Option<EncryptionKey> {
        self.encryption_key.map(EncryptionKey::from_bytes)
    }

    /// # Errors
    /// Returns [`MinileafError::Codec`] if `path` cannot be read or does not parse as TOML.
    pub fn from_toml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| MinileafError::Codec(format!("invalid config TOML: {e}")))
    }

    /// # Errors
    /// Returns [`MinileafError::Codec`] if the config cannot be serialized, or an I/O error if it cannot be written.
    pub fn to_toml(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| MinileafError::Codec(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selects_wal_snapshot_engine() {
        let config = Config::default();
        assert!(config.cache_size.is_none());
        assert!(config.sync_on_write);
    }

    #[test]
    fn builder_methods_compose() {
        let key = EncryptionKey::generate();
        let config = Config::new("/tmp/minileaf").with_cache_size(512).with_encryption_key(&key).with_memory_only(false);
        assert_eq!(config.cache_size, Some(512));
        assert!(config.encryption_key.is_some());
    }

    #[test]
    fn toml_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::new("/tmp/minileaf").with_cache_size(256);
        config.to_toml(&path).unwrap();
        let loaded = Config::from_toml(&path).unwrap();
        assert_eq!(loaded.cache_size, Some(256));
        assert_eq!(loaded.data_dir, config.data_dir);
    }
}
