//! App-private key-value storage backed by a single JSON object file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

const PREFS_FILE: &str = "prefs.json";

#[derive(Clone)]
pub struct PrefsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles against the file.
    lock: Arc<Mutex<()>>,
}

impl PrefsStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        Ok(Self {
            path: dir.join(PREFS_FILE),
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let map = self.read_all().await?;
        Ok(map.get(key).cloned())
    }

    pub async fn put_string(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_all(&map).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        if map.remove(key).is_some() {
            self.write_all(&map).await?;
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                tracing::error!(
                    error = %e,
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    "Preferences file is unreadable, starting from an empty one"
                );
                fs::rename(&self.path, &aside).await?;
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write_all(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let body = serde_json::to_string_pretty(map)
            .map_err(|e| Error::Storage(format!("failed to serialize preferences: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsStore::open(dir.path()).await.unwrap();
        prefs.put_string("a", "1").await.unwrap();
        prefs.put_string("b", "2").await.unwrap();
        prefs.remove("a").await.unwrap();

        let reopened = PrefsStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get_string("a").await.unwrap(), None);
        assert_eq!(reopened.get_string("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn malformed_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsStore::open(dir.path()).await.unwrap();
        tokio::fs::write(prefs.path(), "{not json").await.unwrap();

        assert_eq!(prefs.get_string("a").await.unwrap(), None);
        assert!(dir.path().join("prefs.json.corrupt").exists());
    }
}
