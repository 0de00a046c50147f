mod broadcast;
mod config;
mod db;
mod error;
mod holidays;
mod http;
mod observability;
mod tg;
mod util;

pub use crate::error::{Error, Result};
pub use config::*;
pub use observability::{init_logging, init_metrics, tracing_err, LoggingTask};

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the telegram bot processing loop together with the daily broadcast
pub async fn run(config: Config) -> Result<()> {
    let schedule = broadcast::DailySchedule::from_config(config.broadcast)?;

    let chats = db::init(config.db).await?;

    let holidays = holidays::HolidaysService::new(http::create_client(), config.holidays);

    let opts = tg::RunBotOptions {
        tg_cfg: config.tg,
        chats,
        holidays,
        schedule,
    };

    tg::run_bot(opts).await
}
