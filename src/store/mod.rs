//! JSON-file backed record stores.
//!
//! Each document lives in one file under the data directory and is held in
//! memory behind a mutex. Reads never touch the disk after startup; every
//! mutation is applied to a copy, written atomically and only then committed.

pub mod bids;
pub mod counter;
pub mod permissions;
pub mod tickets;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Loads a document, falling back to `T::default()` when the file is missing
/// or does not parse.
pub async fn load<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Store {} not readable ({}), starting empty", path.display(), e);
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Store {} is corrupt ({}), starting empty", path.display(), e);
            T::default()
        }
    }
}

/// Writes a document next to its destination and renames it into place.
pub async fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub struct JsonStore<T> {
    path: PathBuf,
    data: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = load(&path).await;
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.data.lock().await;
        f(&guard)
    }

    /// Runs `f` against a copy of the document and persists the result.
    ///
    /// The in-memory document only changes when both `f` and the write
    /// succeed.
    pub async fn update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.data.lock().await;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        save(&self.path, &draft).await?;
        *guard = draft;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    type Doc = HashMap<String, u32>;

    #[tokio::test]
    async fn missing_and_corrupt_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Doc = load(&dir.path().join("nope.json")).await;
        assert!(missing.is_empty());

        let corrupt = dir.path().join("corrupt.json");
        tokio::fs::write(&corrupt, b"{ not json").await.unwrap();
        let loaded: Doc = load(&corrupt).await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn update_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let store: JsonStore<Doc> = JsonStore::open(&path).await;
        store
            .update(|doc| {
                doc.insert("a".into(), 1);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        let reopened: JsonStore<Doc> = JsonStore::open(&path).await;
        assert_eq!(reopened.read(|doc| doc.get("a").copied()).await, Some(1));
        assert!(!dir.path().join("doc.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_update_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let store: JsonStore<Doc> = JsonStore::open(&path).await;

        #[derive(Debug)]
        struct Rejected;
        impl From<StoreError> for Rejected {
            fn from(_: StoreError) -> Self {
                Rejected
            }
        }

        let result = store
            .update(|doc| {
                doc.insert("a".into(), 1);
                Err::<(), _>(Rejected)
            })
            .await;

        assert!(result.is_err());
        assert!(store.read(|doc| doc.is_empty()).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn creates_missing_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let store: JsonStore<Doc> = JsonStore::open(&path).await;
        store
            .update(|doc| {
                doc.insert("k".into(), 7);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert!(path.exists());
    }
}
