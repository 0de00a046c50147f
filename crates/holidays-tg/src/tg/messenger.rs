use crate::tg::Bot;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::{ApiError, RequestError};

/// Part of the description of the error that Telegram returns when a user
/// blocked the bot in a private chat.
const BOT_BLOCKED_DESCRIPTION: &str = "bot was blocked by the user";

/// The only thing the bot logic needs from Telegram to deliver messages.
#[async_trait]
pub(crate) trait Messenger: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: String) -> Result<(), RequestError>;
}

#[async_trait]
impl Messenger for Bot {
    async fn send_text(&self, chat: ChatId, text: String) -> Result<(), RequestError> {
        self.send_message(chat, text).await?;
        Ok(())
    }
}

/// Returns `true` if the error means the bot can't post to the chat anymore,
/// because it was blocked or kicked from there, or the user doesn't exist.
pub(crate) fn is_recipient_gone(err: &RequestError) -> bool {
    let RequestError::Api(err) = err else {
        return false;
    };

    match err {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::UserDeactivated => true,
        ApiError::Unknown(description) => description.contains(BOT_BLOCKED_DESCRIPTION),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every message, and fails sending to the chats it was told to
    #[derive(Default)]
    pub(crate) struct FakeMessenger {
        failures: HashMap<ChatId, fn() -> RequestError>,
        attempts: Mutex<Vec<ChatId>>,
        delivered: Mutex<Vec<(ChatId, String)>>,
    }

    impl FakeMessenger {
        pub(crate) fn fail_with(mut self, chat: ChatId, err: fn() -> RequestError) -> Self {
            self.failures.insert(chat, err);
            self
        }

        pub(crate) fn attempts(&self) -> Vec<ChatId> {
            self.attempts.lock().unwrap().clone()
        }

        pub(crate) fn delivered(&self) -> Vec<(ChatId, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_text(&self, chat: ChatId, text: String) -> Result<(), RequestError> {
            self.attempts.lock().unwrap().push(chat);

            if let Some(err) = self.failures.get(&chat) {
                return Err(err());
            }

            self.delivered.lock().unwrap().push((chat, text));
            Ok(())
        }
    }

    #[test]
    fn recipient_gone_classification() {
        let gone = [
            RequestError::Api(ApiError::BotBlocked),
            RequestError::Api(ApiError::BotKicked),
            RequestError::Api(ApiError::BotKickedFromSupergroup),
            RequestError::Api(ApiError::UserDeactivated),
            RequestError::Api(ApiError::Unknown(
                "Forbidden: bot was blocked by the user".to_owned(),
            )),
        ];

        for err in &gone {
            assert!(is_recipient_gone(err), "{err:?}");
        }

        let not_gone = [
            RequestError::Api(ApiError::ChatNotFound),
            RequestError::Api(ApiError::Unknown("Bad Request: message is too long".to_owned())),
        ];

        for err in &not_gone {
            assert!(!is_recipient_gone(err), "{err:?}");
        }
    }
}
