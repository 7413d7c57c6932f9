//! Occurrence expansion -- turns a block and its recurrence rule into concrete
//! `[start, end)` windows.
//!
//! Expansion is lazy and restartable: [`expand`] returns an iterator that
//! recomputes everything from the rule, so calling it twice yields the same
//! sequence and nothing is cached between calls. Wall-clock times are kept in
//! the block's site time zone (via `chrono-tz`) so a 09:00 block stays at 09:00
//! across DST changes.
//!
//! The sequence ends at whichever bound comes first: the rule's terminator,
//! the end of the query window, or the [`HorizonCap`](crate::config::HorizonCap).

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::config::{ExpandContext, HorizonCap};
use crate::dst::{self, DstPolicy};
use crate::error::ExpandError;
use crate::interrupt::Interrupt;
use crate::model::{Block, BlockDefinition, BlockId, Occurrence, TimeWindow};
use crate::rule::{self, RecurrenceRule, Terminator, WeekdaySet};

/// Expand a block definition into the occurrences that overlap `query`.
///
/// The base window is always occurrence 0. Occurrences before `query` still
/// count toward the rule's `count`, so paging through consecutive windows
/// yields a stable sequence. An empty or inverted `query` yields nothing.
///
/// Items are `Err` only once, as the last item: [`ExpandError::InvalidRule`]
/// for a rule that fails its shape checks, [`ExpandError::Interrupted`] when
/// the context's interrupt fires.
pub fn expand<'a>(
    block_id: Option<BlockId>,
    definition: &BlockDefinition,
    query: TimeWindow,
    ctx: &ExpandContext<'a>,
) -> Occurrences<'a> {
    let mut occurrences = Occurrences {
        block_id,
        base: definition.window,
        query,
        series: None,
        max_occurrences: ctx.cap.max_occurrences,
        interrupt: ctx.interrupt,
        next_index: 0,
        state: State::Base,
    };

    if !query.is_valid() || !definition.window.is_valid() || ctx.cap.max_occurrences == 0 {
        occurrences.state = State::Done;
        return occurrences;
    }

    if let Some(rule) = &definition.recurrence {
        if let Err(e) = rule.check_shape() {
            occurrences.state = State::Failed(ExpandError::InvalidRule(e));
            return occurrences;
        }
        let tz = ctx.zones.for_site(&definition.site_id);
        occurrences.series = Some(Series::new(
            rule,
            definition.window,
            definition.is_full_day,
            tz,
            ctx.dst,
            ctx.cap,
        ));
    }

    occurrences
}

/// [`expand`] for a persisted block.
pub fn expand_block<'a>(block: &Block, query: TimeWindow, ctx: &ExpandContext<'a>) -> Occurrences<'a> {
    expand(Some(block.id), &block.definition, query, ctx)
}

enum State {
    Base,
    Series,
    Failed(ExpandError),
    Done,
}

/// Lazy iterator over a block's occurrences. See [`expand`].
pub struct Occurrences<'a> {
    block_id: Option<BlockId>,
    base: TimeWindow,
    query: TimeWindow,
    series: Option<Series>,
    max_occurrences: u32,
    interrupt: &'a dyn Interrupt,
    next_index: u32,
    state: State,
}

impl Iterator for Occurrences<'_> {
    type Item = Result<Occurrence, ExpandError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Failed(e) => return Some(Err(e)),
                State::Base => {
                    if self.interrupt.is_interrupted() {
                        return Some(Err(ExpandError::Interrupted));
                    }
                    self.next_index = 1;
                    if self.base.start >= self.query.end {
                        return None;
                    }
                    self.state = State::Series;
                    if self.base.end > self.query.start {
                        return Some(Ok(Occurrence {
                            block_id: self.block_id,
                            index: 0,
                            window: self.base,
                        }));
                    }
                }
                State::Series => {
                    if self.interrupt.is_interrupted() {
                        return Some(Err(ExpandError::Interrupted));
                    }
                    if self.next_index >= self.max_occurrences {
                        return None;
                    }
                    let series = self.series.as_mut()?;
                    if let Some(count) = series.count {
                        if self.next_index >= count {
                            return None;
                        }
                    }
                    let date = series.next_date()?;
                    self.state = State::Series;

                    // Local time does not exist and the policy is Skip:
                    // nothing generated, nothing counted.
                    let Some(window) = series.window_on(date) else {
                        continue;
                    };

                    let index = self.next_index;
                    self.next_index += 1;

                    if window.start >= self.query.end {
                        self.state = State::Done;
                        return None;
                    }
                    if window.end > self.query.start {
                        return Some(Ok(Occurrence {
                            block_id: self.block_id,
                            index,
                            window,
                        }));
                    }
                }
            }
        }
    }
}

/// The recurring part of an expansion, everything after the base window.
struct Series {
    tz: Tz,
    dst: DstPolicy,
    full_day: bool,
    local_time: NaiveTime,
    duration: Duration,
    base_date: NaiveDate,
    /// Latest date an occurrence may fall on: `until` or the horizon, whichever is earlier.
    last_date: NaiveDate,
    count: Option<u32>,
    cadence: Cadence,
}

enum Cadence {
    Daily {
        step: u64,
        n: u64,
    },
    Weekly {
        interval: i64,
        days: WeekdaySet,
        week0: NaiveDate,
        cursor: NaiveDate,
    },
    Monthly {
        interval: i64,
        day: u32,
        n: i64,
    },
}

impl Series {
    fn new(
        rule: &RecurrenceRule,
        base: TimeWindow,
        full_day: bool,
        tz: Tz,
        dst: DstPolicy,
        cap: HorizonCap,
    ) -> Self {
        let local_start = base.start.with_timezone(&tz);
        let base_date = local_start.date_naive();

        let horizon_date = base_date
            .checked_add_months(cap.span())
            .unwrap_or(NaiveDate::MAX);
        let (last_date, count) = match rule.terminator() {
            Terminator::Until(until) => (until.min(horizon_date), None),
            Terminator::Count(n) => (horizon_date, Some(n)),
        };

        let cadence = match rule {
            RecurrenceRule::Daily { interval, .. } => Cadence::Daily {
                step: *interval as u64,
                n: 0,
            },
            RecurrenceRule::Weekly {
                interval,
                by_weekday,
                ..
            } => Cadence::Weekly {
                interval: *interval as i64,
                days: *by_weekday,
                week0: rule::week_start(base_date),
                cursor: base_date.succ_opt().unwrap_or(NaiveDate::MAX),
            },
            RecurrenceRule::Monthly {
                interval,
                by_month_day,
                ..
            } => Cadence::Monthly {
                interval: *interval as i64,
                day: *by_month_day as u32,
                n: 0,
            },
        };

        Self {
            tz,
            dst,
            full_day,
            local_time: local_start.time(),
            duration: base.duration(),
            base_date,
            last_date,
            count,
            cadence,
        }
    }

    /// Next rule date strictly after the base date, or `None` past `last_date`.
    fn next_date(&mut self) -> Option<NaiveDate> {
        let base_date = self.base_date;
        let last_date = self.last_date;
        match &mut self.cadence {
            Cadence::Daily { step, n } => {
                *n += 1;
                let date = base_date.checked_add_days(Days::new(n.checked_mul(*step)?))?;
                (date <= last_date).then_some(date)
            }
            Cadence::Weekly {
                interval,
                days,
                week0,
                cursor,
            } => loop {
                if *cursor > last_date {
                    return None;
                }
                let weeks = (*cursor - *week0).num_days() / 7;
                let rem = weeks % *interval;
                if rem != 0 {
                    // Jump to the Sunday of the next matching week.
                    let next_week = weeks - rem + *interval;
                    *cursor = week0.checked_add_days(Days::new((next_week * 7) as u64))?;
                    continue;
                }
                let day = *cursor;
                *cursor = cursor.succ_opt().unwrap_or(NaiveDate::MAX);
                if days.contains(day.weekday()) {
                    return Some(day);
                }
                if day == NaiveDate::MAX {
                    return None;
                }
            },
            Cadence::Monthly { interval, day, n } => loop {
                let months = base_date.year() as i64 * 12 + base_date.month0() as i64 + *n * *interval;
                *n += 1;
                let year = i32::try_from(months.div_euclid(12)).ok()?;
                let month = months.rem_euclid(12) as u32 + 1;
                if NaiveDate::from_ymd_opt(year, month, 1)? > last_date {
                    return None;
                }
                // Months without this day are skipped, never clamped.
                match NaiveDate::from_ymd_opt(year, month, *day) {
                    Some(date) if date > last_date => return None,
                    Some(date) if date > base_date => return Some(date),
                    _ => continue,
                }
            },
        }
    }

    fn window_on(&self, date: NaiveDate) -> Option<TimeWindow> {
        if self.full_day {
            return dst::full_day_window(&self.tz, date);
        }
        let start = self.dst.resolve(&self.tz, date.and_time(self.local_time))?;
        Some(TimeWindow::new(start, start + self.duration))
    }
}
