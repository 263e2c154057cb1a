//! Snapshot persistence.
//!
//! One JSON document per collector holds `{tag, payload, expiry}`. The tag is
//! derived from the collector's configuration so a config change invalidates
//! the file without manual versioning. A missing or unreadable file is a
//! cache miss, never an error for the caller of [`CacheStore::load`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache location is empty")]
    EmptyLocation,

    #[error("unsupported cache scheme '{scheme}' (only local paths and file:// are supported)")]
    UnsupportedScheme { scheme: String },

    #[error("invalid cache location '{location}'")]
    InvalidLocation { location: String },

    #[error("cache I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path:?} is corrupt: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A persisted snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub tag: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    #[must_use]
    pub const fn new(tag: String, payload: Value, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            tag,
            payload,
            expiry,
        }
    }

    /// Usable to skip a pass: same tag and an expiry strictly in the future.
    #[must_use]
    pub fn is_fresh(&self, tag: &str, now: DateTime<Utc>) -> bool {
        self.tag == tag && self.expiry.is_some_and(|expiry| expiry > now)
    }
}

/// Derive a cache tag from the structural identity of a configuration.
///
/// The configuration is serialized to JSON and hashed with xxh3. Use ordered
/// collections (`BTreeMap`, `Vec`) in `config` so that equal configurations
/// always serialize identically.
///
/// # Errors
///
/// Returns an error if `config` cannot be serialized.
pub fn tag_for<T: Serialize>(collector: &str, config: &T) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(config)?;
    Ok(format!("{collector}:{:016x}", xxh3_64(&bytes)))
}

/// Resolve a plain path or a `file://` URL to a local path.
///
/// # Errors
///
/// Returns an error for empty locations, malformed URLs and any scheme other
/// than `file`.
pub fn local_path(location: &str) -> Result<PathBuf, CacheError> {
    let location = location.trim();

    if location.is_empty() {
        return Err(CacheError::EmptyLocation);
    }

    if !location.contains("://") {
        return Ok(PathBuf::from(location));
    }

    let url = Url::parse(location).map_err(|_| CacheError::InvalidLocation {
        location: location.to_string(),
    })?;

    if url.scheme() != "file" {
        return Err(CacheError::UnsupportedScheme {
            scheme: url.scheme().to_string(),
        });
    }

    url.to_file_path()
        .map_err(|()| CacheError::InvalidLocation {
            location: location.to_string(),
        })
}

/// Reads and writes one cache file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Build a store from a plain path or a `file://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error for empty locations and for any other URL scheme.
    pub fn new(location: &str) -> Result<Self, CacheError> {
        Ok(Self {
            path: local_path(location)?,
        })
    }

    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the entry, treating every failure as a miss.
    pub async fn load(&self) -> Option<CacheEntry> {
        match self.try_load().await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable cache");
                None
            }
        }
    }

    /// Load the entry; `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub async fn try_load(&self) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache file");
                return Ok(None);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    /// Write the entry atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(entry)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "cache written");

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_new_accepts_paths_and_file_urls() {
        assert_eq!(
            CacheStore::new("/tmp/cache.json").unwrap().path(),
            Path::new("/tmp/cache.json")
        );
        assert_eq!(
            CacheStore::new("file:///tmp/cache.json").unwrap().path(),
            Path::new("/tmp/cache.json")
        );
        assert_eq!(
            CacheStore::new("relative/cache.json").unwrap().path(),
            Path::new("relative/cache.json")
        );
    }

    #[test]
    fn test_new_rejects_other_schemes() {
        assert!(matches!(
            CacheStore::new("azblob://container/cache.json"),
            Err(CacheError::UnsupportedScheme { .. })
        ));
        assert!(matches!(CacheStore::new("  "), Err(CacheError::EmptyLocation)));
    }

    #[test]
    fn test_tag_is_deterministic_and_config_sensitive() {
        let mut a = BTreeMap::new();
        a.insert("ports", "22");
        let mut b = BTreeMap::new();
        b.insert("ports", "23");

        let tag_a = tag_for("portscan", &a).unwrap();
        assert_eq!(tag_a, tag_for("portscan", &a).unwrap());
        assert_ne!(tag_a, tag_for("portscan", &b).unwrap());
        assert_ne!(tag_a, tag_for("inventory", &a).unwrap());
        assert!(tag_a.starts_with("portscan:"));
    }

    #[test]
    fn test_is_fresh() {
        let now = Utc::now();
        let entry = CacheEntry::new("t".into(), json!({}), Some(now + ChronoDuration::seconds(10)));

        assert!(entry.is_fresh("t", now));
        assert!(!entry.is_fresh("other", now));
        assert!(!entry.is_fresh("t", now + ChronoDuration::seconds(10)));

        let no_expiry = CacheEntry::new("t".into(), json!({}), None);
        assert!(!no_expiry.is_fresh("t", now));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::from_path(dir.path().join("nested").join("c.json"));

        let entry = CacheEntry::new("tag".into(), json!({"m": []}), Some(Utc::now()));
        store.save(&entry).await.unwrap();

        assert_eq!(store.load().await, Some(entry));
        assert!(!dir.path().join("nested").join("c.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();

        let missing = CacheStore::from_path(dir.path().join("missing.json"));
        assert!(missing.try_load().await.unwrap().is_none());
        assert!(missing.load().await.is_none());

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, b"{not json").unwrap();
        let corrupt = CacheStore::from_path(&corrupt_path);
        assert!(matches!(corrupt.try_load().await, Err(CacheError::Decode { .. })));
        assert!(corrupt.load().await.is_none());
    }
}
