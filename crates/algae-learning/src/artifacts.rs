//! Artifact persistence.
//!
//! Trained encoders and models are stored as JSON documents under string
//! keys. The [`ArtifactStore`] trait abstracts where they live:
//!
//! - [`FsArtifactStore`]: one file per key in a directory, created on demand
//! - [`MemoryArtifactStore`]: an in-process map, for tests and embedding
//!
//! Every artifact carries a `schema_version` and a `kind` so that a model
//! document is never mistaken for an encoder and older layouts are rejected
//! instead of misread.

use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LearningError, Result};

/// Current artifact layout version.
pub const SCHEMA_VERSION: u32 = 1;
/// `kind` of encoder artifacts.
pub const ENCODER_KIND: &str = "encoder";
/// `kind` of model artifacts.
pub const MODEL_KIND: &str = "model";
/// Key of the training summary document.
pub const SUMMARY_KEY: &str = "training_summary.json";

/// File-system safe form of a species name: whitespace and path separators
/// (`/`, `\`, `:`) become `_`.
pub fn safe_name(species: &str) -> String {
    species
        .chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '/' | '\\' | ':') {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Key of a species' encoder artifact.
pub fn encoder_key(species: &str) -> String {
    format!("encoder_{}.json", safe_name(species))
}

/// Key of a species' model artifact.
pub fn model_key(species: &str) -> String {
    format!("model_{}.json", safe_name(species))
}

#[derive(Deserialize)]
struct ArtifactHeader {
    schema_version: u32,
    kind: String,
}

/// Verify the kind and version of an artifact.
pub(crate) fn check_header(expected_kind: &str, schema_version: u32, kind: &str) -> Result<()> {
    if kind != expected_kind {
        return Err(LearningError::ArtifactFormat {
            key: expected_kind.to_string(),
            reason: format!("expected kind '{expected_kind}', found '{kind}'"),
        });
    }
    if schema_version != SCHEMA_VERSION {
        return Err(LearningError::ArtifactFormat {
            key: expected_kind.to_string(),
            reason: format!(
                "unsupported schema version {schema_version} (supported: {SCHEMA_VERSION})"
            ),
        });
    }
    Ok(())
}

/// Parse an artifact, checking its header before the body.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, expected_kind: &str, text: &str) -> Result<T> {
    let header: ArtifactHeader =
        serde_json::from_str(text).map_err(|e| LearningError::ArtifactFormat {
            key: key.to_string(),
            reason: format!("missing or malformed header: {e}"),
        })?;
    check_header(expected_kind, header.schema_version, &header.kind).map_err(|e| match e {
        LearningError::ArtifactFormat { reason, .. } => LearningError::ArtifactFormat {
            key: key.to_string(),
            reason,
        },
        other => other,
    })?;

    serde_json::from_str(text).map_err(|e| LearningError::ArtifactFormat {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Stores
// =============================================================================

/// Keyed storage of JSON artifacts.
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Store `contents` under `key`, replacing any previous value.
    fn put(&self, key: &str, contents: &str) -> Result<()>;

    /// Read the value under `key`.
    ///
    /// Returns [`LearningError::ArtifactNotFound`] when it does not exist.
    fn get(&self, key: &str) -> Result<String>;

    fn exists(&self, key: &str) -> bool;

    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Artifacts as files in one directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Store rooted at `root`. The directory is created on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(LearningError::ArtifactFormat {
                key: key.to_string(),
                reason: "keys must be plain file names".to_string(),
            });
        }
        Ok(self.root.join(key))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, contents)?;
        debug!("Wrote artifact {}", path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(LearningError::ArtifactNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Artifacts held in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: &str, contents: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| LearningError::ArtifactNotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Ulva lactuca"), "Ulva_lactuca");
        assert_eq!(safe_name("Gracilaria sp./cf"), "Gracilaria_sp._cf");
        assert_eq!(safe_name("A\\B:C\tD"), "A_B_C_D");
        assert_eq!(model_key("Ulva lactuca"), "model_Ulva_lactuca.json");
        assert_eq!(encoder_key("Ulva lactuca"), "encoder_Ulva_lactuca.json");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryArtifactStore::new();
        assert!(store.is_empty());
        store.put("b.json", "{}").unwrap();
        store.put("a.json", "[]").unwrap();
        assert!(store.exists("a.json"));
        assert_eq!(store.get("b.json").unwrap(), "{}");
        assert_eq!(store.keys().unwrap(), vec!["a.json", "b.json"]);
        assert!(matches!(
            store.get("c.json"),
            Err(LearningError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_fs_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("nested").join("models"));
        assert_eq!(store.keys().unwrap(), Vec::<String>::new());

        store.put("model_X.json", "{\"a\":1}").unwrap();
        assert!(store.exists("model_X.json"));
        assert_eq!(store.get("model_X.json").unwrap(), "{\"a\":1}");
        assert_eq!(store.keys().unwrap(), vec!["model_X.json"]);
        assert!(matches!(
            store.get("missing.json"),
            Err(LearningError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_fs_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        assert!(store.put("../escape.json", "{}").is_err());
        assert!(!store.exists("../escape.json"));
    }

    #[test]
    fn test_decode_checks_header_first() {
        let err = decode::<serde_json::Value>("k", MODEL_KIND, r#"{"schema_version":1,"kind":"encoder"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("expected kind 'model'"));

        let err = decode::<serde_json::Value>("k", MODEL_KIND, r#"{"schema_version":9,"kind":"model"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 9"));

        let err = decode::<serde_json::Value>("k", MODEL_KIND, "not json").unwrap_err();
        assert_eq!(err.error_code(), "ARTIFACT_FORMAT");
    }
}
