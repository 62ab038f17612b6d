//! Persistent records.
//!
//! Networks and endpoints are mirrored into a key/value [`Store`] so they
//! can be replayed after a restart. Keys combine the record kind and the
//! object id; endpoint ids are only unique within a network, so endpoint
//! keys carry the network id too.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use noipam_common::{NoipamError, NoipamResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::options::NetworkConfiguration;

const KEY_PREFIX: &str = "noipam";

/// Kind of persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A network configuration.
    Network,
    /// An endpoint.
    Endpoint,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key, rendered as `noipam/<kind>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    /// Record kind.
    pub kind: RecordKind,
    /// Object id.
    pub id: String,
}

impl StoreKey {
    /// Key of a network record.
    pub fn network(id: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Network,
            id: id.into(),
        }
    }

    /// Key of an endpoint record, `<network>.<endpoint>`. Ids never
    /// contain `.`, so the pair is unambiguous.
    pub fn endpoint(network_id: &str, endpoint_id: &str) -> Self {
        Self {
            kind: RecordKind::Endpoint,
            id: format!("{network_id}.{endpoint_id}"),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}/{}/{}", self.kind, self.id)
    }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreRecord {
    /// A network configuration.
    Network(NetworkConfiguration),
    /// An endpoint.
    Endpoint(Endpoint),
}

impl StoreRecord {
    /// The key this record is stored under.
    #[must_use]
    pub fn key(&self) -> StoreKey {
        match self {
            Self::Network(config) => StoreKey::network(config.id.as_str()),
            Self::Endpoint(endpoint) => {
                StoreKey::endpoint(endpoint.network_id.as_str(), endpoint.id.as_str())
            }
        }
    }

    /// The kind of this record.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Network(_) => RecordKind::Network,
            Self::Endpoint(_) => RecordKind::Endpoint,
        }
    }
}

/// Key/value persistence backend.
pub trait Store: Send + Sync + fmt::Debug {
    /// Insert or replace a record.
    fn put(&self, key: &StoreKey, record: &StoreRecord) -> NoipamResult<()>;

    /// Fetch a record.
    fn get(&self, key: &StoreKey) -> NoipamResult<Option<StoreRecord>>;

    /// Remove a record. Removing a missing key is not an error.
    fn delete(&self, key: &StoreKey) -> NoipamResult<()>;

    /// All records of one kind.
    fn list(&self, kind: RecordKind) -> NoipamResult<Vec<StoreRecord>>;
}

/// In-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<StoreKey, StoreRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<StoreKey> {
        self.records.lock().keys().cloned().collect()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &StoreKey, record: &StoreRecord) -> NoipamResult<()> {
        self.records.lock().insert(key.clone(), record.clone());
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> NoipamResult<Option<StoreRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn delete(&self, key: &StoreKey) -> NoipamResult<()> {
        self.records.lock().remove(key);
        Ok(())
    }

    fn list(&self, kind: RecordKind) -> NoipamResult<Vec<StoreRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// [`Store`] keeping one JSON document per key under a directory.
///
/// Layout: `<root>/<kind>/<id>.json`. Writes go through a temporary file in
/// the same directory and are renamed into place.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn path(&self, key: &StoreKey) -> PathBuf {
        self.kind_dir(key.kind).join(format!("{}.json", key.id))
    }

    fn write(&self, key: &StoreKey, record: &StoreRecord) -> std::io::Result<()> {
        let dir = self.kind_dir(key.kind);
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(record)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn read(path: &Path) -> NoipamResult<StoreRecord> {
        let json = fs::read(path)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Store for FileStore {
    fn put(&self, key: &StoreKey, record: &StoreRecord) -> NoipamResult<()> {
        if key.id.contains(['/', '\\']) || key.id.starts_with('.') {
            return Err(NoipamError::store(key, "id is not a valid file name"));
        }
        self.write(key, record)
            .map_err(|e| NoipamError::store(key, e))?;

        tracing::debug!(key = %key, path = %self.path(key).display(), "Saved record");
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> NoipamResult<Option<StoreRecord>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path)
            .map(Some)
            .map_err(|e| NoipamError::store(key, e))
    }

    fn delete(&self, key: &StoreKey) -> NoipamResult<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => {
                tracing::debug!(key = %key, "Deleted record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NoipamError::store(key, e)),
        }
    }

    fn list(&self, kind: RecordKind) -> NoipamResult<Vec<StoreRecord>> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| NoipamError::store(dir.display(), e))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| NoipamError::store(dir.display(), e))?
                .path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read(&path) {
                Ok(record) if record.kind() == kind => records.push(record),
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "Skipping record of the wrong kind");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                }
            }
        }
        records.sort_by_key(StoreRecord::key);
        Ok(records)
    }
}
