//! Engine configuration: site time zones, expansion bounds, DST policy.

use std::collections::HashMap;

use chrono::{Duration, Months};
use chrono_tz::Tz;

use crate::dst::DstPolicy;
use crate::interrupt::{Interrupt, NEVER};
use crate::model::TimeWindow;

/// Hard ceiling on occurrence generation, independent of the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonCap {
    /// Maximum occurrences generated per block, base included.
    pub max_occurrences: u32,
    /// No occurrence falls more than this many years after the base date.
    pub max_years: u32,
}

impl Default for HorizonCap {
    fn default() -> Self {
        Self {
            max_occurrences: 1000,
            max_years: 5,
        }
    }
}

impl HorizonCap {
    pub(crate) fn span(&self) -> Months {
        Months::new(self.max_years.saturating_mul(12))
    }
}

/// Maps sites to their IANA time zone. Full-day semantics and recurrence
/// wall-clock times are computed in the site's zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeZones {
    pub default: Tz,
    pub sites: HashMap<String, Tz>,
}

impl Default for TimeZones {
    fn default() -> Self {
        Self {
            default: Tz::UTC,
            sites: HashMap::new(),
        }
    }
}

impl TimeZones {
    pub fn new(default: Tz) -> Self {
        Self {
            default,
            sites: HashMap::new(),
        }
    }

    pub fn with_site(mut self, site_id: impl Into<String>, tz: Tz) -> Self {
        self.sites.insert(site_id.into(), tz);
        self
    }

    pub fn for_site(&self, site_id: &str) -> Tz {
        self.sites.get(site_id).copied().unwrap_or(self.default)
    }

    /// Parse `site=Area/City` pairs separated by commas.
    pub fn parse_sites(raw: &str) -> Result<HashMap<String, Tz>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (site, zone) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected site=Zone, got '{}'", pair))?;
                let tz: Tz = zone
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid time zone '{}' for site '{}'", zone, site))?;
                Ok((site.trim().to_string(), tz))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub zones: TimeZones,
    pub dst: DstPolicy,
    pub cap: HorizonCap,
    /// How far past a block's base start the conflict check looks.
    pub conflict_horizon_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zones: TimeZones::default(),
            dst: DstPolicy::default(),
            cap: HorizonCap::default(),
            conflict_horizon_days: 365,
        }
    }
}

impl EngineConfig {
    pub fn with_zones(zones: TimeZones) -> Self {
        Self {
            zones,
            ..Self::default()
        }
    }

    /// Expansion context that never interrupts.
    pub fn context(&self) -> ExpandContext<'_> {
        self.context_with(&NEVER)
    }

    pub fn context_with<'a>(&'a self, interrupt: &'a dyn Interrupt) -> ExpandContext<'a> {
        ExpandContext {
            zones: &self.zones,
            dst: self.dst,
            cap: self.cap,
            interrupt,
        }
    }

    /// The window the conflict check covers for a block whose base window is `base`.
    pub fn conflict_window(&self, base: &TimeWindow) -> TimeWindow {
        let span = Duration::days(self.conflict_horizon_days.max(1) as i64);
        let end = base
            .start
            .checked_add_signed(span)
            .unwrap_or(base.end)
            .max(base.end);
        TimeWindow::new(base.start, end)
    }

    /// The appointments a conflict check for `base` has to see. The last
    /// occurrence may start inside the conflict window and end after it, so
    /// the window is widened by one occurrence plus a day of DST slack.
    pub fn appointment_window(&self, base: &TimeWindow) -> TimeWindow {
        let horizon = self.conflict_window(base);
        let tail = base.duration() + Duration::days(1);
        let end = horizon
            .end
            .checked_add_signed(tail)
            .unwrap_or(horizon.end);
        TimeWindow::new(horizon.start, end)
    }

    pub fn tz(&self, site_id: &str) -> Tz {
        self.zones.for_site(site_id)
    }
}

/// Everything the expander needs besides the block and query window.
#[derive(Clone, Copy)]
pub struct ExpandContext<'a> {
    pub zones: &'a TimeZones,
    pub dst: DstPolicy,
    pub cap: HorizonCap,
    pub interrupt: &'a dyn Interrupt,
}
