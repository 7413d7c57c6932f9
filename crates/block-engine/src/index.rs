//! Per-resource interval index over active appointments and persisted blocks.
//!
//! Appointments are kept sorted by start so a query only scans candidates
//! whose start falls before the query's end, and skips those that ended more
//! than the longest appointment's length before the query's start. Blocks are
//! expanded on demand within the queried window.

use std::collections::HashMap;

use chrono::Duration;
use serde::Serialize;

use crate::config::ExpandContext;
use crate::error::ExpandError;
use crate::expander;
use crate::model::{Appointment, Block, BlockId, ResourceRef, TimeWindow};

/// Which sources an overlap query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sources {
    Appointments,
    Blocks,
    All,
}

impl Sources {
    fn appointments(self) -> bool {
        matches!(self, Sources::Appointments | Sources::All)
    }

    fn blocks(self) -> bool {
        matches!(self, Sources::Blocks | Sources::All)
    }
}

/// Something already occupying the resource during part of a queried window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Overlap {
    Appointment {
        appointment_id: String,
        window: TimeWindow,
    },
    Block {
        block_id: BlockId,
        occurrence_index: u32,
        window: TimeWindow,
    },
}

impl Overlap {
    pub fn window(&self) -> TimeWindow {
        match self {
            Overlap::Appointment { window, .. } | Overlap::Block { window, .. } => *window,
        }
    }
}

#[derive(Debug)]
struct AppointmentList {
    by_start: Vec<Appointment>,
    longest: Duration,
}

impl Default for AppointmentList {
    fn default() -> Self {
        Self {
            by_start: Vec::new(),
            longest: Duration::zero(),
        }
    }
}

impl AppointmentList {
    fn insert(&mut self, appointment: Appointment) {
        self.longest = self.longest.max(appointment.window.duration());
        let pos = self
            .by_start
            .partition_point(|a| a.window.start <= appointment.window.start);
        self.by_start.insert(pos, appointment);
    }

    fn overlapping(&self, window: TimeWindow) -> impl Iterator<Item = &Appointment> {
        let upper = self
            .by_start
            .partition_point(|a| a.window.start < window.end);
        let lower = match window.start.checked_sub_signed(self.longest) {
            Some(earliest) => self.by_start[..upper].partition_point(|a| a.window.start < earliest),
            None => 0,
        };
        self.by_start[lower..upper]
            .iter()
            .filter(move |a| a.window.overlaps(&window))
    }
}

/// Snapshot of what occupies each resource. Built per request from the
/// appointment source and the block store; never shared mutable state.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    appointments: HashMap<ResourceRef, AppointmentList>,
    blocks: HashMap<ResourceRef, Vec<Block>>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index; inactive (cancelled or void) appointments are dropped.
    pub fn from_parts(
        appointments: impl IntoIterator<Item = Appointment>,
        blocks: impl IntoIterator<Item = Block>,
    ) -> Self {
        let mut index = Self::new();
        for appointment in appointments {
            index.insert_appointment(appointment);
        }
        for block in blocks {
            index.insert_block(block);
        }
        index
    }

    pub fn insert_appointment(&mut self, appointment: Appointment) {
        if !appointment.status.is_active() || !appointment.window.is_valid() {
            return;
        }
        self.appointments
            .entry(appointment.resource())
            .or_default()
            .insert(appointment);
    }

    pub fn insert_block(&mut self, block: Block) {
        self.blocks
            .entry(block.definition.resource())
            .or_default()
            .push(block);
    }

    /// Active appointments of `resource` overlapping `window`, by start time.
    pub fn appointments_overlapping<'s>(
        &'s self,
        resource: &ResourceRef,
        window: TimeWindow,
    ) -> impl Iterator<Item = &'s Appointment> {
        self.appointments
            .get(resource)
            .into_iter()
            .flat_map(move |list| list.overlapping(window))
    }

    /// Persisted blocks of `resource`, in insertion order.
    pub fn blocks_of(&self, resource: &ResourceRef) -> &[Block] {
        self.blocks.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Everything in `sources` that overlaps `window` for `resource`.
    ///
    /// The block with id `exclude_block_id` is ignored, so a block under edit
    /// never conflicts with its own previous occurrences.
    pub fn overlaps_any(
        &self,
        resource: &ResourceRef,
        window: TimeWindow,
        exclude_block_id: Option<BlockId>,
        sources: Sources,
        ctx: &ExpandContext<'_>,
    ) -> Result<Vec<Overlap>, ExpandError> {
        let mut overlaps = Vec::new();

        if sources.appointments() {
            overlaps.extend(self.appointments_overlapping(resource, window).map(|a| {
                Overlap::Appointment {
                    appointment_id: a.id.clone(),
                    window: a.window,
                }
            }));
        }

        if sources.blocks() {
            for block in self.blocks_of(resource) {
                if Some(block.id) == exclude_block_id {
                    continue;
                }
                for occurrence in expander::expand_block(block, window, ctx) {
                    let occurrence = occurrence?;
                    overlaps.push(Overlap::Block {
                        block_id: block.id,
                        occurrence_index: occurrence.index,
                        window: occurrence.window,
                    });
                }
            }
        }

        Ok(overlaps)
    }
}
