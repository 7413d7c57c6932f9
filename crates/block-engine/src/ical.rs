//! RFC 5545 export of block recurrence, for calendar consumers.
//!
//! Renders a [`RecurrenceRule`] as RRULE text and parses it back through the
//! `rrule` crate so the exported text is known to be valid iCalendar.
//!
//! Validated rules always start on a date they produce (the base weekday is
//! in `BYDAY`, the base day is the `BYMONTHDAY`), so `DTSTART` plus the RRULE
//! yields the same dates as [`expand`](crate::expander::expand).

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::config::TimeZones;
use crate::error::RuleError;
use crate::model::BlockDefinition;
use crate::rule::{RecurrenceRule, Terminator};

const WEEKDAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// RRULE text for a rule whose block lives in `tz` (e.g. `FREQ=WEEKLY;INTERVAL=2;WKST=SU;BYDAY=MO,WE;COUNT=10`).
///
/// `UNTIL` is the end of the inclusive until-date in local time, suffixed
/// with `Z` only when the zone is UTC, because the `rrule` crate requires
/// `UNTIL` and `DTSTART` to share a zone form.
pub fn rrule_text(rule: &RecurrenceRule, tz: &Tz) -> String {
    let mut parts = match rule {
        RecurrenceRule::Daily { interval, .. } => {
            vec!["FREQ=DAILY".to_string(), format!("INTERVAL={}", interval)]
        }
        RecurrenceRule::Weekly {
            interval,
            by_weekday,
            ..
        } => {
            let days: Vec<&str> = by_weekday
                .iter()
                .map(|d| WEEKDAY_CODES[d.num_days_from_sunday() as usize])
                .collect();
            vec![
                "FREQ=WEEKLY".to_string(),
                format!("INTERVAL={}", interval),
                "WKST=SU".to_string(),
                format!("BYDAY={}", days.join(",")),
            ]
        }
        RecurrenceRule::Monthly {
            interval,
            by_month_day,
            ..
        } => vec![
            "FREQ=MONTHLY".to_string(),
            format!("INTERVAL={}", interval),
            format!("BYMONTHDAY={}", by_month_day),
        ],
    };

    match rule.terminator() {
        Terminator::Count(n) => parts.push(format!("COUNT={}", n)),
        Terminator::Until(date) => {
            let mut until = format!("UNTIL={}T235959", date.format("%Y%m%d"));
            if *tz == Tz::UTC {
                until.push('Z');
            }
            parts.push(until);
        }
    }

    parts.join(";")
}

/// RRULE text for a block; non-recurring blocks export as a single instance.
pub fn block_rrule_text(definition: &BlockDefinition, zones: &TimeZones) -> String {
    let tz = zones.for_site(&definition.site_id);
    match &definition.recurrence {
        Some(rule) => rrule_text(rule, &tz),
        None => "FREQ=DAILY;COUNT=1".to_string(),
    }
}

/// Parse the block's DTSTART + RRULE through the `rrule` crate.
///
/// # Errors
/// Returns a [`RuleError`] on the `rrule` field if the crate rejects the text.
pub fn rrule_set(definition: &BlockDefinition, zones: &TimeZones) -> Result<RRuleSet, RuleError> {
    let tz = zones.for_site(&definition.site_id);
    let local_start = definition.window.start.with_timezone(&tz).naive_local();
    let text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        tz.name(),
        local_start.format("%Y%m%dT%H%M%S"),
        block_rrule_text(definition, zones)
    );
    text.parse::<RRuleSet>()
        .map_err(|e| RuleError::new("rrule", e.to_string()))
}

/// First `limit` start instants of an exported rule set, in UTC.
pub fn export_starts(set: &RRuleSet, limit: u16) -> Vec<DateTime<Utc>> {
    set.clone()
        .all(limit)
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect()
}
