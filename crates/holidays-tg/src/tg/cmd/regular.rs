use crate::holidays::HolidaysService;
use crate::prelude::*;
use crate::tg::{self, Messenger};
use crate::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Команды:")]
pub(crate) enum Cmd {
    #[command(description = "праздники сегодня")]
    Holidays,

    #[command(description = "список команд")]
    Help,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::Holidays => send_holidays(&ctx.bot, &ctx.holidays, msg.chat.id).await,
            Cmd::Help => {
                ctx.bot
                    .send_text(msg.chat.id, Cmd::descriptions().to_string())
                    .await?;
                Ok(())
            }
        }
    }
}

async fn send_holidays(
    messenger: &dyn Messenger,
    holidays: &HolidaysService,
    chat: ChatId,
) -> Result {
    let text = holidays.fetch().await.to_message();

    messenger.send_text(chat, text).await?;

    info!("Sent holidays on demand");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::HOLIDAYS_HEADER;
    use crate::tg::FakeMessenger;

    #[test_log::test(tokio::test)]
    async fn holidays_are_sent_to_the_requesting_chat() {
        let messenger = FakeMessenger::default();
        let holidays = HolidaysService::unreachable();

        send_holidays(&messenger, &holidays, ChatId(500)).await.unwrap();

        let delivered = messenger.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, ChatId(500));
        assert!(delivered[0].1.starts_with(HOLIDAYS_HEADER));

        send_holidays(&messenger, &holidays, ChatId(500)).await.unwrap();

        let delivered = messenger.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0], delivered[1]);
    }

    #[test]
    fn help_lists_all_commands() {
        let help = Cmd::descriptions().to_string();

        assert!(help.starts_with("Команды:"), "{help}");
        assert!(help.contains("/holidays"), "{help}");
        assert!(help.contains("/help"), "{help}");
    }
}
