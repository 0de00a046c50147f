//! Daily broadcast of the holidays to all registered chats

mod schedule;

use crate::db::TgChatsRepo;
use crate::holidays::HolidaysService;
use crate::prelude::*;
use crate::tg::{self, Messenger};
use chrono::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;

pub(crate) use schedule::DailySchedule;

/// Longest single sleep while waiting for the trigger. Tokio timers don't
/// advance while the host is suspended, so the wall clock is rechecked at
/// least this often.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
pub(crate) struct Config {
    /// Local time of the day in the format `HH:MM:SS`
    #[serde(default = "default_time")]
    pub(crate) time: NaiveTime,

    #[serde(default = "default_utc_offset_minutes")]
    pub(crate) utc_offset_minutes: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time: default_time(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).expect("BUG: 08:00:00 is a valid time")
}

fn default_utc_offset_minutes() -> i32 {
    // Moscow time
    3 * 60
}

/// Outcome of a single broadcast run
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BroadcastReport {
    pub(crate) delivered: Vec<ChatId>,

    /// Chats that blocked or kicked the bot. They are unregistered.
    pub(crate) removed: Vec<ChatId>,

    /// Chats where the message wasn't delivered for any other reason
    pub(crate) failed: Vec<ChatId>,
}

/// Runs the broadcast every day according to the schedule. Never returns.
///
/// Runs are executed one after another in this loop, so they never overlap
/// even if one of them takes longer than a day.
pub(crate) async fn run(ctx: Arc<tg::Ctx>) {
    let mut last_trigger = None;

    loop {
        let now = Utc::now();
        let next = next_trigger(&ctx.schedule, now, last_trigger);

        info!(
            %next,
            sleep = tracing_duration((next - now).to_std().unwrap_or(Duration::ZERO)),
            "Waiting for the next broadcast"
        );

        sleep_until(next).await;

        last_trigger = Some(next);

        run_once(&ctx.bot, &ctx.chats, &ctx.holidays)
            .instrument(info_span!("broadcast", %next))
            .await;
    }
}

/// The trigger that is already done is never scheduled again, even if the
/// wall clock was moved back behind it.
fn next_trigger(
    schedule: &DailySchedule,
    now: DateTime<Utc>,
    last_trigger: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let from = last_trigger.map_or(now, |last| last.max(now));
    schedule.next_after(from)
}

/// Sleeps until the wall clock reaches `deadline`
async fn sleep_until(deadline: DateTime<Utc>) {
    loop {
        // Negative duration means the deadline has already passed
        let Ok(left) = (deadline - Utc::now()).to_std() else {
            return;
        };

        if left.is_zero() {
            return;
        }

        tokio::time::sleep(left.min(MAX_SLEEP)).await;
    }
}

/// Fetches the holidays once and sends them to every registered chat
pub(crate) async fn run_once(
    messenger: &dyn Messenger,
    chats: &TgChatsRepo,
    holidays: &HolidaysService,
) -> BroadcastReport {
    let text = holidays.fetch().await.to_message();
    broadcast(messenger, chats, &text).await
}

async fn broadcast(messenger: &dyn Messenger, chats: &TgChatsRepo, text: &str) -> BroadcastReport {
    // The set may change while we are sending, so we iterate over a copy
    // and apply our own removals only when the loop is over.
    let recipients = chats.snapshot().await;

    info!(recipients = recipients.len(), "Starting the broadcast");

    let mut report = BroadcastReport::default();

    for chat in recipients {
        let Err(err) = messenger.send_text(chat, text.to_owned()).await else {
            report.delivered.push(chat);
            continue;
        };

        let gone = tg::is_recipient_gone(&err);

        warn!(
            %chat,
            gone,
            err = tracing_err(&err),
            "Failed to send holidays to the chat"
        );

        if gone {
            report.removed.push(chat);
        } else {
            report.failed.push(chat);
        }
    }

    if !report.removed.is_empty() {
        if let Err(err) = chats.remove_many(&report.removed).await {
            error!(
                err = tracing_err(&err),
                chats = ?report.removed,
                "Failed to unregister the chats that are gone"
            );
        }
    }

    let outcomes = [
        ("delivered", &report.delivered),
        ("removed", &report.removed),
        ("failed", &report.failed),
    ];

    for (outcome, list) in outcomes {
        metrics::counter!("broadcast_messages_total", list.len() as u64, "outcome" => outcome);
    }

    info!(
        delivered = report.delivered.len(),
        removed = report.removed.len(),
        failed = report.failed.len(),
        "Broadcast finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tg::FakeMessenger;
    use expect_test::expect;
    use teloxide::{ApiError, RequestError};

    struct Fixture {
        _dir: tempfile::TempDir,
        file: std::path::PathBuf,
        chats: TgChatsRepo,
    }

    async fn fixture(chats: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chats.json");
        std::fs::write(&file, chats).unwrap();

        let chats = TgChatsRepo::load(file.clone()).await.unwrap();

        Fixture {
            _dir: dir,
            file,
            chats,
        }
    }

    fn utc(datetime: &str) -> DateTime<Utc> {
        datetime.parse().unwrap()
    }

    #[test]
    fn trigger_is_not_repeated_after_clock_goes_back() {
        let schedule = DailySchedule::from_config(Config::default()).unwrap();

        // 08:00 in Moscow
        let fired = utc("2024-03-10T05:00:00Z");

        assert_eq!(
            next_trigger(&schedule, utc("2024-03-10T04:59:00Z"), None),
            fired,
        );

        // The clock was stepped back by a few minutes after the broadcast
        assert_eq!(
            next_trigger(&schedule, utc("2024-03-10T04:57:00Z"), Some(fired)),
            utc("2024-03-11T05:00:00Z"),
        );

        assert_eq!(
            next_trigger(&schedule, utc("2024-03-10T05:00:01Z"), Some(fired)),
            utc("2024-03-11T05:00:00Z"),
        );
    }

    #[test_log::test(tokio::test)]
    async fn sleep_until_wall_clock_deadline() {
        sleep_until(Utc::now() - chrono::Duration::minutes(1)).await;

        let deadline = Utc::now() + chrono::Duration::milliseconds(50);
        sleep_until(deadline).await;

        assert!(Utc::now() >= deadline);
    }

    #[test_log::test(tokio::test)]
    async fn blocked_chat_is_unregistered() {
        let fixture = fixture("[100, 200]").await;

        let messenger = FakeMessenger::default()
            .fail_with(ChatId(200), || RequestError::Api(ApiError::BotBlocked));

        let report = broadcast(&messenger, &fixture.chats, "holidays").await;

        assert_eq!(
            report,
            BroadcastReport {
                delivered: vec![ChatId(100)],
                removed: vec![ChatId(200)],
                failed: vec![],
            }
        );

        assert_eq!(messenger.attempts(), [ChatId(100), ChatId(200)]);
        assert_eq!(messenger.delivered(), [(ChatId(100), "holidays".to_owned())]);
        assert_eq!(fixture.chats.snapshot().await, [ChatId(100)]);
        assert_eq!(fixture.chats.saves(), 1);

        let contents = std::fs::read_to_string(&fixture.file).unwrap();
        expect!["[100]"].assert_eq(&contents);
    }

    #[test_log::test(tokio::test)]
    async fn blocked_chat_is_detected_by_description() {
        let fixture = fixture("[100, 200]").await;

        let messenger = FakeMessenger::default().fail_with(ChatId(200), || {
            RequestError::Api(ApiError::Unknown(
                "Forbidden: bot was blocked by the user".to_owned(),
            ))
        });

        let report = broadcast(&messenger, &fixture.chats, "holidays").await;

        assert_eq!(report.removed, [ChatId(200)]);
        assert_eq!(fixture.chats.snapshot().await, [ChatId(100)]);
    }

    #[test_log::test(tokio::test)]
    async fn other_failures_keep_the_chat() {
        let fixture = fixture("[100, 200, 300]").await;

        let messenger = FakeMessenger::default()
            .fail_with(ChatId(100), || RequestError::Api(ApiError::ChatNotFound))
            .fail_with(ChatId(300), || RequestError::Api(ApiError::BotKicked));

        let report = broadcast(&messenger, &fixture.chats, "holidays").await;

        assert_eq!(
            report,
            BroadcastReport {
                delivered: vec![ChatId(200)],
                removed: vec![ChatId(300)],
                failed: vec![ChatId(100)],
            }
        );

        assert_eq!(messenger.attempts(), [ChatId(100), ChatId(200), ChatId(300)]);
        assert_eq!(fixture.chats.snapshot().await, [ChatId(100), ChatId(200)]);
        assert_eq!(fixture.chats.saves(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn same_holidays_text_for_all_chats() {
        let fixture = fixture("[1, 2, 3]").await;
        let messenger = FakeMessenger::default();

        let report = run_once(&messenger, &fixture.chats, &HolidaysService::unreachable()).await;

        assert_eq!(report.delivered, [ChatId(1), ChatId(2), ChatId(3)]);

        let delivered = messenger.delivered();
        assert!(delivered.iter().all(|(_, text)| *text == delivered[0].1));

        expect![[r#"
            Праздники сегодня:

            Извините, не удалось получить информацию о праздниках."#]]
        .assert_eq(&delivered[0].1);
    }

    #[test_log::test(tokio::test)]
    async fn nothing_to_do_without_chats() {
        let fixture = fixture("[]").await;
        let messenger = FakeMessenger::default();

        let report = broadcast(&messenger, &fixture.chats, "holidays").await;

        assert_eq!(report, BroadcastReport::default());
        assert!(messenger.attempts().is_empty());
        assert_eq!(fixture.chats.saves(), 0);
    }
}
