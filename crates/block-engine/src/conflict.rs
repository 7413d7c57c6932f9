//! Detect appointments that a candidate block would silently overlap.
//!
//! Only appointment overlaps are blocking. Block-vs-block overlap is allowed
//! (an administrator may stack blocks) and is reported separately by
//! [`ConflictDetector::block_overlaps`] for information only.
//!
//! Adjacent intervals (one ends exactly when the other starts) are NOT conflicts.

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ExpandContext};
use crate::error::ExpandError;
use crate::expander;
use crate::index::{IntervalIndex, Overlap, Sources};
use crate::model::{BlockDefinition, BlockId, Occurrence, ResourceRef, TimeWindow};

/// A detected overlap between two windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub window_a: TimeWindow,
    pub window_b: TimeWindow,
    pub overlap_minutes: i64,
}

/// Find all pairwise conflicts (overlapping time ranges) between two window lists.
///
/// Two windows overlap when `a.start < b.end && b.start < a.end`.
/// The overlap duration is `min(a.end, b.end) - max(a.start, b.start)`.
pub fn find_conflicts(windows_a: &[TimeWindow], windows_b: &[TimeWindow]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for a in windows_a {
        for b in windows_b {
            if let Some(overlap) = a.intersection(b) {
                conflicts.push(Conflict {
                    window_a: *a,
                    window_b: *b,
                    overlap_minutes: overlap.duration().num_minutes(),
                });
            }
        }
    }

    conflicts
}

/// One occurrence of the candidate and the appointments it overlaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceConflict {
    pub occurrence: Occurrence,
    pub conflicting_appointment_ids: Vec<String>,
}

/// Result of a conflict check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub has_conflict: bool,
    /// Every conflicting occurrence within the horizon, in occurrence order.
    pub conflicts: Vec<OccurrenceConflict>,
}

impl ConflictReport {
    fn from_conflicts(conflicts: Vec<OccurrenceConflict>) -> Self {
        Self {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        }
    }

    /// The earliest conflicting occurrence, for fast interactive feedback.
    pub fn first(&self) -> Option<&OccurrenceConflict> {
        self.conflicts.first()
    }

    /// Distinct conflicting appointment ids, in first-seen order.
    pub fn appointment_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self
            .conflicts
            .iter()
            .flat_map(|c| c.conflicting_appointment_ids.iter())
        {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }
}

/// An informational overlap between the candidate and another persisted block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockOverlap {
    pub occurrence: Occurrence,
    pub other_block_id: BlockId,
    pub other_window: TimeWindow,
    pub overlap_minutes: i64,
}

/// Checks candidate blocks against an [`IntervalIndex`]. Read-only.
pub struct ConflictDetector<'a> {
    index: &'a IntervalIndex,
    config: &'a EngineConfig,
    ctx: ExpandContext<'a>,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(index: &'a IntervalIndex, config: &'a EngineConfig, ctx: ExpandContext<'a>) -> Self {
        Self { index, config, ctx }
    }

    /// Check every occurrence of the candidate within the conflict horizon.
    ///
    /// `block_id` is the id of the block under edit, if any; it is excluded
    /// from the index so re-validating an unchanged block is idempotent.
    pub fn check(
        &self,
        block_id: Option<BlockId>,
        definition: &BlockDefinition,
    ) -> Result<ConflictReport, ExpandError> {
        self.scan(block_id, definition, false)
    }

    /// Like [`check`](Self::check) but stops at the first conflicting occurrence.
    pub fn check_first(
        &self,
        block_id: Option<BlockId>,
        definition: &BlockDefinition,
    ) -> Result<ConflictReport, ExpandError> {
        self.scan(block_id, definition, true)
    }

    /// Check a single interval, without recurrence.
    pub fn check_interval(&self, resource: &ResourceRef, window: TimeWindow) -> ConflictReport {
        let ids: Vec<String> = self
            .index
            .appointments_overlapping(resource, window)
            .map(|a| a.id.clone())
            .collect();
        if ids.is_empty() {
            return ConflictReport::default();
        }
        ConflictReport::from_conflicts(vec![OccurrenceConflict {
            occurrence: Occurrence {
                block_id: None,
                index: 0,
                window,
            },
            conflicting_appointment_ids: ids,
        }])
    }

    /// Other blocks of the same resource that the candidate overlaps.
    pub fn block_overlaps(
        &self,
        block_id: Option<BlockId>,
        definition: &BlockDefinition,
    ) -> Result<Vec<BlockOverlap>, ExpandError> {
        let horizon = self.horizon(definition);
        let occurrences = expander::expand(block_id, definition, horizon, &self.ctx)
            .collect::<Result<Vec<Occurrence>, ExpandError>>()?;
        let candidate_windows: Vec<TimeWindow> = occurrences.iter().map(|o| o.window).collect();

        let mut overlaps = Vec::new();
        for other in self.index.blocks_of(&definition.resource()) {
            if Some(other.id) == block_id {
                continue;
            }
            let other_windows = expander::expand_block(other, horizon, &self.ctx)
                .map(|o| o.map(|o| o.window))
                .collect::<Result<Vec<TimeWindow>, ExpandError>>()?;
            for conflict in find_conflicts(&candidate_windows, &other_windows) {
                let Some(occurrence) = occurrences.iter().find(|o| o.window == conflict.window_a) else {
                    continue;
                };
                overlaps.push(BlockOverlap {
                    occurrence: occurrence.clone(),
                    other_block_id: other.id,
                    other_window: conflict.window_b,
                    overlap_minutes: conflict.overlap_minutes,
                });
            }
        }
        Ok(overlaps)
    }

    fn horizon(&self, definition: &BlockDefinition) -> TimeWindow {
        self.config.conflict_window(&definition.window)
    }

    fn scan(
        &self,
        block_id: Option<BlockId>,
        definition: &BlockDefinition,
        stop_at_first: bool,
    ) -> Result<ConflictReport, ExpandError> {
        let resource = definition.resource();
        let horizon = self.horizon(definition);
        let mut conflicts = Vec::new();

        for occurrence in expander::expand(block_id, definition, horizon, &self.ctx) {
            let occurrence = occurrence?;
            let ids: Vec<String> = self
                .index
                .overlaps_any(
                    &resource,
                    occurrence.window,
                    block_id,
                    Sources::Appointments,
                    &self.ctx,
                )?
                .into_iter()
                .filter_map(|overlap| match overlap {
                    Overlap::Appointment { appointment_id, .. } => Some(appointment_id),
                    Overlap::Block { .. } => None,
                })
                .collect();

            if !ids.is_empty() {
                conflicts.push(OccurrenceConflict {
                    occurrence,
                    conflicting_appointment_ids: ids,
                });
                if stop_at_first {
                    break;
                }
            }
        }

        Ok(ConflictReport::from_conflicts(conflicts))
    }
}
