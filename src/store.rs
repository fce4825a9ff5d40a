use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::BotError;
use crate::pagination::{PageState, SessionKey};

/// Durable map of session key → `PageState`, one JSON file per active
/// session so a restart keeps open browsers alive. Writes go through a
/// temp file + rename; readers never see a half-written state.
#[derive(Clone)]
pub struct PageStore {
    dir: PathBuf,
    // per-key mutexes serializing read-modify-write cycles; a double-tap
    // on prev/next queues behind the first callback instead of racing it
    locks: Arc<Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>>,
}

impl PageStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, BotError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Guard for one session. Callers hold it across get → mutate → put.
    pub async fn lock(&self, key: SessionKey) -> OwnedMutexGuard<()> {
        let per_key = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        per_key.lock_owned().await
    }

    fn path(&self, key: SessionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.storage_name()))
    }

    /// Overwrites any existing state under the same key.
    pub async fn put(&self, state: &PageState) -> Result<(), BotError> {
        let path = self.path(state.key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(state)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Absent (or unreadable) state is a normal condition: the browsing
    /// message may be older than the stored sessions.
    pub async fn get(&self, key: SessionKey) -> Result<Option<PageState>, BotError> {
        match fs::read(self.path(key)).await {
            Ok(data) => Ok(serde_json::from_slice(&data).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// No-op when the key is already gone. The per-key mutex entry is
    /// kept: another task may still hold a clone of its `Arc`, and
    /// evicting it would let a later `lock` mint a second mutex for the
    /// same key.
    pub async fn delete(&self, key: SessionKey) -> Result<(), BotError> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
