//! Disk-backed key-value store.
//!
//! One file per key inside a directory. File names are the hex encoding of the
//! key so arbitrary keys stay filesystem-safe. Hex doubles the length, so keys
//! are limited to `MAX_KEY_BYTES` to keep names under the usual 255-byte cap.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::KeyValueStore;
use crate::error::{OfflineError, Result};

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "tmp";

/// Longest key, in bytes, the store accepts.
pub const MAX_KEY_BYTES: usize = 120;

// == File Store ==
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), EXTENSION))
    }

    fn fits(key: &str) -> bool {
        key.len() <= MAX_KEY_BYTES
    }

    /// Unique per write, so concurrent sets of one key never share a temp file.
    fn tmp_path(&self) -> PathBuf {
        self.root
            .join(format!(".{}.{}", uuid::Uuid::new_v4(), TMP_EXTENSION))
    }

    fn is_tmp(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == TMP_EXTENSION)
    }

    fn key_for(path: &Path) -> Option<String> {
        if path.extension()? != EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !Self::fits(key) {
            return Ok(None);
        }
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        if !Self::fits(key) {
            return Err(OfflineError::InvalidKey(format!(
                "key is {} bytes, the limit is {}",
                key.len(),
                MAX_KEY_BYTES
            )));
        }

        // Write-then-rename so a crash never leaves a half-written value
        let path = self.path_for(key);
        let tmp = self.tmp_path();
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !Self::fits(key) {
            return Ok(());
        }
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if Self::is_tmp(&path) {
                continue;
            }
            match Self::key_for(&path) {
                Some(key) => keys.push(key),
                None => warn!("Ignoring foreign file in store: {}", path.display()),
            }
        }

        Ok(keys)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}
