use super::Config;
use crate::prelude::*;
use crate::Result;
use chrono::prelude::*;
use std::fmt;

/// Moscow doesn't observe DST, so a fixed offset describes it exactly
const MSK_OFFSET_SECS: i32 = 3 * 60 * 60;

/// Wall-clock time of the day in a fixed timezone when the broadcast happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DailySchedule {
    time: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    pub(crate) fn from_config(cfg: Config) -> Result<Self> {
        let offset = cfg
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .fatal_ctx(|| {
                format!(
                    "UTC offset of the broadcast is out of range: {} minutes",
                    cfg.utc_offset_minutes
                )
            })?;

        Ok(Self {
            time: cfg.time,
            offset,
        })
    }

    /// The closest moment strictly after `now` when the broadcast should happen
    pub(crate) fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.offset).naive_local();

        let mut next = local_now.date().and_time(self.time);
        if next <= local_now {
            next += chrono::Duration::days(1);
        }

        let utc = next - chrono::Duration::seconds(self.offset.local_minus_utc().into());

        Utc.from_utc_datetime(&utc)
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.time.format("%-H:%M");

        if self.offset.local_minus_utc() == MSK_OFFSET_SECS {
            return write!(f, "{time} по МСК");
        }

        write!(f, "{time} (UTC{})", self.offset)
    }
}
