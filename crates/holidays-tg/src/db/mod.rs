//! Durable state of the bot. The only thing persisted is the set of chats
//! that receive the daily broadcast, and it lives in a plain JSON file.

mod error;
mod tg_chats;

use crate::prelude::*;
use crate::Result;
use serde::Deserialize;
use std::path::PathBuf;

pub(crate) use error::*;
pub(crate) use tg_chats::*;

#[derive(Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_chats_file")]
    pub(crate) file: PathBuf,
}

fn default_chats_file() -> PathBuf {
    "chats.json".into()
}

pub(crate) async fn init(cfg: Config) -> Result<TgChatsRepo> {
    let repo = TgChatsRepo::load(cfg.file).await?;

    info!(chats = repo.len().await, "Loaded the chats registry");

    Ok(repo)
}
