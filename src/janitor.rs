//! Daily purge of expired refresh records.
//!
//! The next fire instant is recomputed from the local wall clock on every
//! cycle rather than sleeping a fixed 24 h, so daylight-saving changes do not
//! drift the schedule.

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::api::handlers::auth::storage::RefreshStore;

/// Spawn the cleanup loop. Errors are logged and the loop continues.
pub fn spawn_daily_cleanup(
    store: Arc<dyn RefreshStore>,
    fire_at: NaiveTime,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_run(&Local::now(), fire_at);
            info!(
                "next expired-refresh-record cleanup in {} seconds",
                wait.as_secs()
            );
            sleep(wait).await;

            match store.delete_expired().await {
                Ok(count) => info!(count, "expired refresh records deleted"),
                Err(err) => error!("refresh record cleanup failed: {err}"),
            }

            // Small buffer so the next wall-clock computation lands past the
            // fire time just handled.
            sleep(Duration::from_secs(1)).await;
        }
    })
}

/// Time until the next occurrence of `fire_at` strictly after `now`.
///
/// Local times skipped by a DST gap yield no candidate for that day;
/// ambiguous times resolve to their earliest mapping.
fn until_next_run<Tz: TimeZone>(now: &DateTime<Tz>, fire_at: NaiveTime) -> Duration {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(fire_at)).earliest()
            && candidate > *now
        {
            return (candidate - now.clone()).to_std().unwrap_or(Duration::ZERO);
        }
        let Some(next_date) = date.succ_opt() else {
            break;
        };
        date = next_date;
    }
    Duration::from_secs(24 * 60 * 60)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn fire_time_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let wait = until_next_run(&now, at(12, 0));
        assert_eq!(wait, Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn fire_time_already_passed_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap();
        let wait = until_next_run(&now, at(12, 0));
        assert_eq!(wait, Duration::from_secs((24 - 1) * 60 * 60 - 30 * 60));
    }

    #[test]
    fn exact_fire_time_schedules_a_full_day_out() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let wait = until_next_run(&now, at(12, 0));
        assert_eq!(wait, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn midnight_fire_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap();
        let wait = until_next_run(&now, at(0, 0));
        assert_eq!(wait, Duration::from_secs(60 * 60));
    }
}
