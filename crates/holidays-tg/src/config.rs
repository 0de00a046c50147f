use crate::{broadcast, db, holidays, tg};
use serde::de::DeserializeOwned;

pub struct Config {
    pub(crate) tg: tg::Config,
    pub(crate) db: db::Config,
    pub(crate) holidays: holidays::Config,
    pub(crate) broadcast: broadcast::Config,
}

impl Config {
    /// Panics if any of the required variables are missing, e.g. `BOT_TOKEN`
    pub fn load_or_panic() -> Config {
        Self {
            tg: from_env_or_panic("BOT_"),
            db: from_env_or_panic("CHATS_"),
            holidays: from_env_or_panic("HOLIDAYS_"),
            broadcast: from_env_or_panic("BROADCAST_"),
        }
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
