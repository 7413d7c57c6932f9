//! DST transition policies for recurring blocks, and resolution of site-local
//! wall-clock times to UTC instants.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::TimeWindow;

/// Policy for occurrences whose local time falls in a DST gap.
///
/// Ambiguous local times (the repeated hour when clocks fall back) always
/// resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Skip occurrences that fall in the DST gap (e.g. 02:30 during spring forward).
    /// A skipped occurrence does not count toward the rule's `count`.
    Skip,
    /// Shift to the first valid local time after the gap.
    ShiftForward,
    /// Keep the UTC offset in effect before the transition (02:30 becomes 03:30).
    #[default]
    WallClock,
}

impl DstPolicy {
    /// Resolve a site-local wall-clock time to UTC under this policy.
    /// Returns `None` only for [`DstPolicy::Skip`] inside a gap.
    pub fn resolve(self, tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => match self {
                DstPolicy::Skip => None,
                DstPolicy::ShiftForward => first_valid_after(tz, local),
                DstPolicy::WallClock => {
                    // Gaps never exceed a day; the offset a day earlier is the
                    // one in force before the transition.
                    let before = local - Duration::days(1);
                    let offset = tz.offset_from_local_datetime(&before).earliest()?;
                    let utc_offset = Duration::seconds(offset.fix().local_minus_utc() as i64);
                    Some((local - utc_offset).and_utc())
                }
            },
        }
    }
}

/// First local minute after `local` that exists in `tz`.
fn first_valid_after(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=24 * 60).find_map(|minutes| {
        let candidate = local + Duration::minutes(minutes);
        tz.from_local_datetime(&candidate)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Start of the local calendar day `date` in `tz`, as UTC.
///
/// Some zones move their clocks at midnight, so the day may start at 01:00.
pub fn local_day_start(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    DstPolicy::ShiftForward.resolve(tz, date.and_time(NaiveTime::MIN))
}

/// The half-open window covering the whole local calendar day `date`:
/// `[date 00:00, date+1 00:00)` in site-local time.
pub fn full_day_window(tz: &Tz, date: NaiveDate) -> Option<TimeWindow> {
    let start = local_day_start(tz, date)?;
    let end = local_day_start(tz, date.succ_opt()?)?;
    Some(TimeWindow::new(start, end))
}

/// Normalize any instant to the full local day containing it.
pub fn normalize_full_day(tz: &Tz, instant: DateTime<Utc>) -> Option<TimeWindow> {
    full_day_window(tz, local_date(tz, instant))
}

/// Calendar date of `instant` in `tz`.
pub fn local_date(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}
