//! Local state store: one formatted JSON file per provisioned resource.
//!
//! Entries live at `<root>/<kind>/<name>.json`, or at
//! `<root>/<kind>/<name>/<sub_id>.json` for entries that need a second
//! identifier (access keys are keyed by user name and access key ID).
//! Files are always replaced whole: the new content is written next to the
//! target and renamed over it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;

use crate::types::ResourceKind;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state entry {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Deterministic identifier of a local state entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub kind: ResourceKind,
    pub name: String,
    pub sub_id: Option<String>,
}

impl StateKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            sub_id: None,
        }
    }

    pub fn with_sub_id(kind: ResourceKind, name: impl Into<String>, sub_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            sub_id: Some(sub_id.into()),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_id {
            Some(sub_id) => write!(f, "{}/{}/{}", self.kind, self.name, sub_id),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, so names map
/// to a single path component.
fn path_component(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        format!("_{}", sanitized.replace('.', "_"))
    } else {
        sanitized
    }
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

#[derive(Debug, Clone)]
pub struct LocalStateStore {
    root: PathBuf,
}

impl LocalStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &StateKey) -> PathBuf {
        let kind_dir = self.root.join(key.kind.as_str());
        match &key.sub_id {
            Some(sub_id) => kind_dir
                .join(path_component(&key.name))
                .join(format!("{}.json", path_component(sub_id))),
            None => kind_dir.join(format!("{}.json", path_component(&key.name))),
        }
    }

    /// Persist `descriptor` under `key`, replacing any previous entry.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &StateKey, descriptor: &T) -> StoreResult<PathBuf> {
        let path = self.path_for(key);
        let content = to_pretty_json(descriptor).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io("create directory", parent, e))?;
        }

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, &content)
            .await
            .map_err(|e| StoreError::io("write", &staging, e))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::io("replace", &path, e))?;

        log::trace!("Stored {} at {}", key, path.display());
        Ok(path)
    }

    /// Read the entry stored under `key`. A missing file is `Ok(None)`; a file
    /// that does not parse is [`StoreError::Corrupt`].
    pub async fn get<T: DeserializeOwned>(&self, key: &StateKey) -> StoreResult<Option<T>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Delete the entry stored under `key`. Returns whether a file existed.
    pub async fn remove(&self, key: &StateKey) -> StoreResult<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("remove", &path, e)),
        }
    }

    /// Keys of every entry stored for `kind`, sorted.
    pub async fn list(&self, kind: ResourceKind) -> StoreResult<Vec<StateKey>> {
        let kind_dir = self.root.join(kind.as_str());
        let mut keys = Vec::new();

        for (path, is_dir) in read_dir_sorted(&kind_dir).await? {
            if is_dir {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                for (sub_path, sub_is_dir) in read_dir_sorted(&path).await? {
                    if sub_is_dir || !is_json(&sub_path) {
                        continue;
                    }
                    if let Some(sub_id) = file_stem(&sub_path) {
                        keys.push(StateKey::with_sub_id(kind, name, sub_id));
                    }
                }
            } else if is_json(&path) {
                if let Some(name) = file_stem(&path) {
                    keys.push(StateKey::new(kind, name));
                }
            }
        }

        Ok(keys)
    }

    /// Sub-identifiers stored under `kind`/`name` (access key IDs of a user).
    pub async fn list_sub_ids(&self, kind: ResourceKind, name: &str) -> StoreResult<Vec<String>> {
        let dir = self.root.join(kind.as_str()).join(path_component(name));
        Ok(read_dir_sorted(&dir)
            .await?
            .into_iter()
            .filter(|(path, is_dir)| !is_dir && is_json(path))
            .filter_map(|(path, _)| file_stem(&path))
            .collect())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// Directory entries as `(path, is_dir)`, sorted; a missing directory is empty.
async fn read_dir_sorted(dir: &Path) -> StoreResult<Vec<(PathBuf, bool)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("read directory", dir, e)),
    };

    let mut listed = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io("read directory entry", dir, e))?
    {
        let path = entry.path();
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| StoreError::io("read metadata", &path, e))?;
        listed.push((path, metadata.is_dir()));
    }

    listed.sort();
    Ok(listed)
}
