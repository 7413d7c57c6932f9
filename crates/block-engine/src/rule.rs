//! Recurrence rules: the immutable sum type attached to a block, the
//! weekday set it uses, and the draft builder that gates entry into it.
//!
//! A [`RecurrenceRule`] carries only the fields its kind needs: `by_weekday`
//! exists only on [`RecurrenceRule::Weekly`], `by_month_day` only on
//! [`RecurrenceRule::Monthly`]. The only way to obtain one from untrusted
//! input is [`RecurrenceDraft::validate`].

use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// How a recurring block stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    /// Last calendar date (site-local, inclusive) on which an occurrence may fall.
    Until(NaiveDate),
    /// Maximum number of occurrences, the base window included.
    Count(u32),
}

/// A set of weekdays stored as seven bits, Sunday = bit 0 … Saturday = bit 6.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const fn empty() -> Self {
        WeekdaySet(0)
    }

    /// Build a set from weekday numbers (0 = Sunday … 6 = Saturday).
    /// Rejects out-of-range and repeated values.
    pub fn from_numbers(numbers: &[u8]) -> Result<Self, RuleError> {
        let mut set = WeekdaySet::empty();
        for &n in numbers {
            if n > 6 {
                return Err(RuleError::new(
                    "by_weekday",
                    format!("weekday {} is outside 0 (Sunday) ..= 6 (Saturday)", n),
                ));
            }
            if !set.insert(weekday_from_sunday(n)) {
                return Err(RuleError::new(
                    "by_weekday",
                    format!("weekday {} is listed more than once", n),
                ));
            }
        }
        Ok(set)
    }

    /// Returns `false` if the day was already present.
    pub fn insert(&mut self, day: Weekday) -> bool {
        let bit = 1u8 << day.num_days_from_sunday();
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1u8 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Sunday … Saturday order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        (0u8..7)
            .filter(move |n| self.0 & (1u8 << n) != 0)
            .map(weekday_from_sunday)
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = RuleError;

    fn try_from(numbers: Vec<u8>) -> Result<Self, Self::Error> {
        WeekdaySet::from_numbers(&numbers)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().map(|d| d.num_days_from_sunday() as u8).collect()
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub(crate) fn weekday_from_sunday(n: u8) -> Weekday {
    match n % 7 {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

/// The repetition policy attached to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceRule {
    /// Every `interval` days.
    Daily { interval: u32, terminator: Terminator },
    /// On the listed weekdays of every `interval`-th week.
    Weekly {
        interval: u32,
        terminator: Terminator,
        by_weekday: WeekdaySet,
    },
    /// On `by_month_day` of every `interval`-th month. Months without that
    /// day are skipped, never clamped to the month's last day.
    Monthly {
        interval: u32,
        terminator: Terminator,
        by_month_day: u8,
    },
}

impl RecurrenceRule {
    pub fn kind(&self) -> RecurrenceKind {
        match self {
            RecurrenceRule::Daily { .. } => RecurrenceKind::Daily,
            RecurrenceRule::Weekly { .. } => RecurrenceKind::Weekly,
            RecurrenceRule::Monthly { .. } => RecurrenceKind::Monthly,
        }
    }

    pub fn interval(&self) -> u32 {
        match self {
            RecurrenceRule::Daily { interval, .. }
            | RecurrenceRule::Weekly { interval, .. }
            | RecurrenceRule::Monthly { interval, .. } => *interval,
        }
    }

    pub fn terminator(&self) -> Terminator {
        match self {
            RecurrenceRule::Daily { terminator, .. }
            | RecurrenceRule::Weekly { terminator, .. }
            | RecurrenceRule::Monthly { terminator, .. } => *terminator,
        }
    }

    /// Full validation against the base block's site-local start date.
    pub fn validate(&self, base_date: NaiveDate) -> Result<(), RuleError> {
        self.check_shape()?;
        if let Terminator::Until(until) = self.terminator() {
            if until < base_date {
                return Err(RuleError::new(
                    "until",
                    format!("{} is earlier than the block start date {}", until, base_date),
                ));
            }
        }
        // The base window is occurrence 0, so it has to satisfy the rule.
        match self {
            RecurrenceRule::Weekly { by_weekday, .. } if !by_weekday.contains(base_date.weekday()) => {
                Err(RuleError::new(
                    "by_weekday",
                    format!("the block starts on a {}, which is not a rule weekday", base_date.weekday()),
                ))
            }
            RecurrenceRule::Monthly { by_month_day, .. }
                if base_date.day() != u32::from(*by_month_day) =>
            {
                Err(RuleError::new(
                    "by_month_day",
                    format!("the block starts on day {}, not day {}", base_date.day(), by_month_day),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Checks that do not depend on the base window. The expander runs these
    /// before generating anything so a malformed stored rule cannot loop.
    pub(crate) fn check_shape(&self) -> Result<(), RuleError> {
        if self.interval() < 1 {
            return Err(RuleError::new("interval", "must be at least 1"));
        }
        if let Terminator::Count(0) = self.terminator() {
            return Err(RuleError::new("count", "must be at least 1"));
        }
        match self {
            RecurrenceRule::Weekly { by_weekday, .. } if by_weekday.is_empty() => Err(
                RuleError::new("by_weekday", "weekly rules need at least one weekday"),
            ),
            RecurrenceRule::Monthly { by_month_day, .. } if !(1..=31).contains(by_month_day) => {
                Err(RuleError::new(
                    "by_month_day",
                    format!("{} is outside 1 ..= 31", by_month_day),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
}

/// Unvalidated recurrence input, shaped like the form that edits it.
///
/// Every field is optional and loosely typed so that [`validate`](Self::validate)
/// can report which field is wrong instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceDraft {
    pub kind: Option<RecurrenceKind>,
    pub interval: Option<i64>,
    pub until: Option<NaiveDate>,
    pub count: Option<i64>,
    pub by_weekday: Option<Vec<i64>>,
    pub by_month_day: Option<i64>,
}

impl RecurrenceDraft {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind: Some(kind),
            interval: Some(1),
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: i64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn by_weekday(mut self, days: impl IntoIterator<Item = i64>) -> Self {
        self.by_weekday = Some(days.into_iter().collect());
        self
    }

    pub fn by_month_day(mut self, day: i64) -> Self {
        self.by_month_day = Some(day);
        self
    }

    /// Turn the draft into an immutable rule anchored at `base_date`.
    pub fn validate(&self, base_date: NaiveDate) -> Result<RecurrenceRule, RuleError> {
        let kind = self
            .kind
            .ok_or_else(|| RuleError::new("kind", "recurrence kind is required"))?;

        let interval = match self.interval.unwrap_or(1) {
            n if n < 1 => return Err(RuleError::new("interval", "must be at least 1")),
            n => u32::try_from(n).map_err(|_| RuleError::new("interval", "is too large"))?,
        };

        let terminator = match (self.until, self.count) {
            (Some(_), Some(_)) => {
                return Err(RuleError::new(
                    "terminator",
                    "set either until or count, not both",
                ))
            }
            (None, None) => {
                return Err(RuleError::new(
                    "terminator",
                    "one of until or count is required",
                ))
            }
            (Some(until), None) => Terminator::Until(until),
            (None, Some(n)) if n < 1 => {
                return Err(RuleError::new("count", "must be at least 1"))
            }
            (None, Some(n)) => Terminator::Count(
                u32::try_from(n).map_err(|_| RuleError::new("count", "is too large"))?,
            ),
        };

        if kind != RecurrenceKind::Weekly && self.by_weekday.is_some() {
            return Err(RuleError::new(
                "by_weekday",
                "only weekly rules take weekdays",
            ));
        }
        if kind != RecurrenceKind::Monthly && self.by_month_day.is_some() {
            return Err(RuleError::new(
                "by_month_day",
                "only monthly rules take a day of month",
            ));
        }

        let rule = match kind {
            RecurrenceKind::Daily => RecurrenceRule::Daily {
                interval,
                terminator,
            },
            RecurrenceKind::Weekly => {
                let days = self.by_weekday.as_deref().unwrap_or_default();
                let numbers = days
                    .iter()
                    .map(|&d| {
                        u8::try_from(d).map_err(|_| {
                            RuleError::new(
                                "by_weekday",
                                format!("weekday {} is outside 0 (Sunday) ..= 6 (Saturday)", d),
                            )
                        })
                    })
                    .collect::<Result<Vec<u8>, RuleError>>()?;
                RecurrenceRule::Weekly {
                    interval,
                    terminator,
                    by_weekday: WeekdaySet::from_numbers(&numbers)?,
                }
            }
            RecurrenceKind::Monthly => {
                let day = self.by_month_day.ok_or_else(|| {
                    RuleError::new("by_month_day", "monthly rules need a day of month")
                })?;
                if !(1..=31).contains(&day) {
                    return Err(RuleError::new(
                        "by_month_day",
                        format!("{} is outside 1 ..= 31", day),
                    ));
                }
                RecurrenceRule::Monthly {
                    interval,
                    terminator,
                    by_month_day: day as u8,
                }
            }
        };

        rule.validate(base_date)?;
        Ok(rule)
    }
}

impl From<&RecurrenceRule> for RecurrenceDraft {
    fn from(rule: &RecurrenceRule) -> Self {
        let (until, count) = match rule.terminator() {
            Terminator::Until(d) => (Some(d), None),
            Terminator::Count(n) => (None, Some(n as i64)),
        };
        let mut draft = RecurrenceDraft {
            kind: Some(rule.kind()),
            interval: Some(rule.interval() as i64),
            until,
            count,
            ..RecurrenceDraft::default()
        };
        match rule {
            RecurrenceRule::Weekly { by_weekday, .. } => {
                draft.by_weekday = Some(
                    by_weekday
                        .iter()
                        .map(|d| d.num_days_from_sunday() as i64)
                        .collect(),
                );
            }
            RecurrenceRule::Monthly { by_month_day, .. } => {
                draft.by_month_day = Some(*by_month_day as i64);
            }
            RecurrenceRule::Daily { .. } => {}
        }
        draft
    }
}

/// Sunday that starts the week containing `date`.
pub(crate) fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_sunday() as i64)
}
