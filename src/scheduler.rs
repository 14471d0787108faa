//! Daily reminder trigger.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use relay_dispatch::ReminderRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// True once the local clock has passed `send_at` on a day that has not run yet.
pub(crate) fn is_due(now_local: NaiveDateTime, send_at: NaiveTime, last_run: Option<NaiveDate>) -> bool {
    now_local.time() >= send_at && last_run != Some(now_local.date())
}

/// Background task: run reminders once a day at `send_at` (relay timezone).
///
/// A run skipped because WhatsApp is offline does not count; the next poll
/// tries again the same day.
pub(crate) async fn reminder_loop(
    runner: Arc<ReminderRunner>,
    tz: Tz,
    send_at: NaiveTime,
    poll_secs: u64,
) {
    info!("reminder scheduler: daily at {} ({tz})", send_at.format("%H:%M"));
    let mut last_run: Option<NaiveDate> = None;

    loop {
        tokio::time::sleep(Duration::from_secs(poll_secs.max(1))).await;

        let now_local = Utc::now().with_timezone(&tz).naive_local();
        if !is_due(now_local, send_at, last_run) {
            continue;
        }

        let date = now_local.date();
        let result = runner.run(date).await;
        if result.skipped {
            warn!("reminder scheduler: run for {date} skipped, retrying next poll");
            continue;
        }

        last_run = Some(date);
        info!(
            "reminder scheduler: {date} done ({} sent, {} failed)",
            result.sent, result.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn eight() -> NaiveTime {
        NaiveTime::from_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn test_not_due_before_send_time() {
        assert!(!is_due(at(15, 7, 59), eight(), None));
    }

    #[test]
    fn test_due_at_and_after_send_time() {
        assert!(is_due(at(15, 8, 0), eight(), None));
        assert!(is_due(at(15, 14, 30), eight(), None));
    }

    #[test]
    fn test_once_per_day() {
        let ran = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert!(!is_due(at(15, 9, 0), eight(), ran));
        assert!(!is_due(at(16, 7, 0), eight(), ran));
        assert!(is_due(at(16, 8, 1), eight(), ran));
    }
}
