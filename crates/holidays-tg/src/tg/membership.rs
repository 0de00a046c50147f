//! Tracking of the chats the bot is a member of

use crate::broadcast::DailySchedule;
use crate::db::TgChatsRepo;
use crate::prelude::*;
use crate::tg::{self, Messenger};
use crate::util::DynResult;
use crate::{Error, Result};
use futures::prelude::*;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind, Me, User, UserId};

#[instrument(skip_all, fields(chat = %msg.chat.debug_id()))]
pub(crate) async fn handle_new_chat_members(
    ctx: Arc<tg::Ctx>,
    me: Me,
    msg: Message,
    users: Vec<User>,
) -> DynResult {
    async {
        let added: Vec<_> = users.iter().map(|user| user.id).collect();

        on_members_added(
            &ctx.bot,
            &ctx.chats,
            &ctx.schedule,
            me.user.id,
            msg.chat.id,
            &added,
        )
        .await?;

        Ok::<_, Error>(())
    }
    .err_into()
    .await
}

#[instrument(skip_all, fields(
    chat = %msg.chat.debug_id(),
    user = %user.debug_id(),
))]
pub(crate) async fn handle_left_chat_member(
    ctx: Arc<tg::Ctx>,
    me: Me,
    msg: Message,
    user: User,
) -> DynResult {
    async {
        on_member_left(&ctx.chats, me.user.id, msg.chat.id, user.id).await?;
        Ok::<_, Error>(())
    }
    .err_into()
    .await
}

/// Updates about the bot's own membership. Only the ones where the bot
/// lost access to the chat pass the filter. Joins are handled by
/// [`handle_new_chat_members`] to greet the chat only once.
pub(crate) fn filter_bot_removed(update: ChatMemberUpdated) -> bool {
    membership_lost(&update.old_chat_member.kind, &update.new_chat_member.kind)
}

#[instrument(skip_all, fields(
    chat = %update.chat.debug_id(),
    from = %update.from.debug_id(),
))]
pub(crate) async fn handle_bot_removed(ctx: Arc<tg::Ctx>, update: ChatMemberUpdated) -> DynResult {
    async {
        let removed = ctx.chats.remove(update.chat.id).await?;

        info!(removed, "Bot was removed from the chat");

        Ok::<_, Error>(())
    }
    .err_into()
    .await
}

/// Registers the chat and greets it if the bot is among the added users.
/// Returns `true` if it was.
async fn on_members_added(
    messenger: &dyn Messenger,
    chats: &TgChatsRepo,
    schedule: &DailySchedule,
    me: UserId,
    chat: ChatId,
    added: &[UserId],
) -> Result<bool> {
    if !added.contains(&me) {
        debug!("Ignoring new chat members other than the bot");
        return Ok(false);
    }

    let new = chats.add(chat).await?;

    info!(new, "Bot joined the chat");

    messenger.send_text(chat, welcome_message(schedule)).await?;

    Ok(true)
}

/// Unregisters the chat if the user that left is the bot itself.
/// Returns `true` if it was.
async fn on_member_left(
    chats: &TgChatsRepo,
    me: UserId,
    chat: ChatId,
    left: UserId,
) -> Result<bool> {
    if left != me {
        return Ok(false);
    }

    let removed = chats.remove(chat).await?;

    info!(removed, "Bot left the chat");

    Ok(true)
}

fn is_member(kind: &ChatMemberKind) -> bool {
    use ChatMemberKind::*;
    match kind {
        Owner(_) | Administrator(_) | Member => true,
        Restricted(restricted) => restricted.is_member,
        Left | Banned(_) => false,
    }
}

fn membership_lost(old: &ChatMemberKind, new: &ChatMemberKind) -> bool {
    is_member(old) && !is_member(new)
}

fn welcome_message(schedule: &DailySchedule) -> String {
    format!(
        "Привет! Я буду отправлять список праздников каждый день в {schedule}. \
        Используйте команду /holidays, чтобы получить список праздников прямо сейчас."
    )
}
