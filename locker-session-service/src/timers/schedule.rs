//! Session time arithmetic.
//!
//! Everything here is pure: callers pass `now` explicitly so the same
//! functions serve scheduling, completion and the remaining-time query.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// Start time plus the planned duration plus every extension, in minutes.
pub fn true_end_time<I>(start_time: DateTime<Utc>, planned_minutes: i32, extensions: I) -> DateTime<Utc>
where
    I: IntoIterator<Item = i32>,
{
    let extended: i64 = extensions.into_iter().map(i64::from).sum();
    start_time + Duration::minutes(i64::from(planned_minutes) + extended)
}

/// Whole minutes left until `end_time`, never negative.
///
/// Partial minutes are truncated: 90 seconds left reports 1.
pub fn remaining_minutes(end_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end_time - now).num_minutes().max(0)
}

/// Whole minutes elapsed since `start_time`, truncated and clamped at zero.
pub fn actual_duration_minutes(start_time: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let minutes = (now - start_time).num_minutes().max(0);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

/// Delay before `end_time` fires, or `None` when it is already due.
pub fn delay_until(end_time: DateTime<Utc>, now: DateTime<Utc>) -> Option<std::time::Duration> {
    if end_time <= now {
        return None;
    }
    (end_time - now).to_std().ok()
}

/// The calendar day a completion at `now` is counted under (server local time).
pub fn statistics_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// UTC bounds `[start, end)` of a local calendar day.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = |d: NaiveDate| {
        let naive = d.and_time(NaiveTime::MIN);
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    };
    let next = date.succ_opt().unwrap_or(date);
    (local_midnight(date), local_midnight(next))
}
