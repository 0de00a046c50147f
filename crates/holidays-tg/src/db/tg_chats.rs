use super::DbError;
use crate::error::err_ctx;
use crate::prelude::*;
use crate::Result;
use fs_err::tokio as fs;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use teloxide::types::ChatId;
use tokio::sync::Mutex;

/// Set of chats the bot was added to.
///
/// Every mutation rewrites the whole file before returning, so the file is
/// always a snapshot of the in-memory set. The lock is held for the duration
/// of the write, which means concurrent mutations are persisted in the same
/// order they were applied.
pub(crate) struct TgChatsRepo {
    path: PathBuf,
    chats: Mutex<BTreeSet<i64>>,

    /// Number of writes of the file since it was loaded
    saves: AtomicUsize,
}

impl TgChatsRepo {
    /// Loads the set from the file. A missing file means no chats yet.
    pub(crate) async fn load(path: PathBuf) -> Result<Self> {
        let chats = match fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Chats file doesn't exist yet, starting empty");
                BTreeSet::new()
            }
            Err(err) => return Err(err_ctx!(DbError::Read)(err)),
        };

        Ok(Self {
            path,
            chats: Mutex::new(chats),
            saves: AtomicUsize::new(0),
        })
    }

    /// Returns `true` if the chat wasn't registered before
    pub(crate) async fn add(&self, chat: ChatId) -> Result<bool> {
        let mut chats = self.chats.lock().await;
        if !chats.insert(chat.0) {
            return Ok(false);
        }
        self.save(&chats).await?;

        info!(%chat, total = chats.len(), "Registered chat");

        Ok(true)
    }

    /// Returns `true` if the chat was registered before
    pub(crate) async fn remove(&self, chat: ChatId) -> Result<bool> {
        Ok(self.remove_many(&[chat]).await? > 0)
    }

    /// Removes all the given chats and persists the result once.
    /// Returns the number of chats that were actually removed.
    pub(crate) async fn remove_many(&self, to_remove: &[ChatId]) -> Result<usize> {
        let mut chats = self.chats.lock().await;

        let removed = to_remove
            .iter()
            .filter(|chat| chats.remove(&chat.0))
            .count();

        if removed == 0 {
            return Ok(0);
        }

        self.save(&chats).await?;

        info!(
            chats = ?to_remove,
            removed,
            total = chats.len(),
            "Unregistered chats"
        );

        Ok(removed)
    }

    /// Copy of the current set, safe to iterate while the set is mutated
    pub(crate) async fn snapshot(&self) -> Vec<ChatId> {
        self.chats.lock().await.iter().copied().map(ChatId).collect()
    }

    pub(crate) async fn len(&self) -> usize {
        self.chats.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Writes a temp file next to the target and renames it over the target
    /// so that a crash in the middle of the write never corrupts the file.
    async fn save(&self, chats: &BTreeSet<i64>) -> Result {
        let json = serde_json::to_vec(chats)
            .fatal_ctx(|| "Failed to serialize the chats set to JSON")?;

        let tmp = tmp_path(&self.path);

        fs::write(&tmp, json)
            .await
            .map_err(err_ctx!(DbError::Write))?;

        fs::rename(&tmp, &self.path)
            .await
            .map_err(err_ctx!(DbError::Write))?;

        let saves = self.saves.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(
            path = %self.path.display(),
            chats = chats.len(),
            saves,
            "Saved chats file"
        );

        Ok(())
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<BTreeSet<i64>> {
    serde_json::from_slice(bytes).map_err(err_ctx!(DbError::CorruptStorage {
        path: path.to_owned()
    }))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    tmp.into()
}
