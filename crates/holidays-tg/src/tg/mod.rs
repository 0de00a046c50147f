//! Telegram side of the bot: routing of the updates and the bot's commands

mod cmd;
mod config;
mod membership;
mod messenger;

use crate::broadcast::{self, DailySchedule};
use crate::db::TgChatsRepo;
use crate::holidays::HolidaysService;
use crate::prelude::*;
use crate::util::DynError;
use crate::Result;
use dptree::di::DependencyMap;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, Throttle, Trace};
use teloxide::dispatching::{ShutdownToken, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

pub(crate) use config::*;
pub(crate) use messenger::{is_recipient_gone, Messenger};

#[cfg(test)]
pub(crate) use messenger::tests::FakeMessenger;

pub(crate) type Bot = Trace<CacheMe<Throttle<teloxide::Bot>>>;

pub(crate) struct Ctx {
    pub(crate) bot: Bot,
    pub(crate) chats: TgChatsRepo,
    pub(crate) holidays: HolidaysService,
    pub(crate) schedule: DailySchedule,
}

pub(crate) struct RunBotOptions {
    pub(crate) tg_cfg: Config,
    pub(crate) chats: TgChatsRepo,
    pub(crate) holidays: HolidaysService,
    pub(crate) schedule: DailySchedule,
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let mut di = DependencyMap::new();

    let bot: Bot = teloxide::Bot::new(opts.tg_cfg.token)
        .throttle(Default::default())
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all());

    let ctx = Arc::new(Ctx {
        bot: bot.clone(),
        chats: opts.chats,
        holidays: opts.holidays,
        schedule: opts.schedule,
    });

    di.insert(ctx.clone());

    info!(schedule = %ctx.schedule, "Starting bot...");

    bot.set_my_commands(cmd::regular::Cmd::bot_commands())
        .await?;

    let handler = dptree::entry()
        .inspect(|update: Update| {
            metrics::increment_counter!(
                "tg_updates_total",
                "kind" => update.kind.discriminator()
            );
        })
        .branch(
            Update::filter_message()
                .chain(Message::filter_new_chat_members())
                .endpoint(membership::handle_new_chat_members),
        )
        .branch(
            Update::filter_message()
                .chain(Message::filter_left_chat_member())
                .endpoint(membership::handle_left_chat_member),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_my_chat_member()
                .filter(membership::filter_bot_removed)
                .endpoint(membership::handle_bot_removed),
        )
        .inspect(|update: Update| {
            metrics::increment_counter!(
                "tg_updates_skipped_total",
                "kind" => update.kind.discriminator()
            );
        });

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(di)
        // We don't handle all possible messages that users send,
        // so to suppress the warning that we don't do this we have
        // a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .error_handler(Arc::new(|err: Box<DynError>| async move {
            error!(err = %err.display_chain(), "Update handler returned an error");
        }))
        .build();

    tokio::spawn(stop_on_signal(dispatcher.shutdown_token()));

    tokio::select! {
        () = dispatcher.dispatch() => {}
        () = broadcast::run(ctx) => {}
    }

    info!("Bot stopped");

    Ok(())
}

async fn stop_on_signal(token: ShutdownToken) {
    shutdown_signal().await;

    info!("Received a shutdown signal, stopping the bot...");

    match token.shutdown() {
        Ok(stopped) => stopped.await,
        Err(err) => warn!(
            err = tracing_err(&err),
            "Dispatcher isn't running, nothing to stop"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(err = tracing_err(&err), "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
