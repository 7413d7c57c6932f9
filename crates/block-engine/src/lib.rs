//! # block-engine
//!
//! Recurring resource blocks for a multi-site practice: rooms and
//! practitioners taken out of service for maintenance, training or absence.
//!
//! The engine turns a block and its recurrence rule into concrete occurrences,
//! checks every occurrence against active appointments before anything is
//! written, and commits through a store that serializes writes per resource.
//! Time zone and DST handling go through `chrono-tz`; the optional RFC 5545
//! export goes through the `rrule` crate.
//!
//! ## Modules
//!
//! - [`rule`] -- recurrence rules, weekday sets, and the draft validator
//! - [`expander`] -- block + rule → lazy sequence of occurrences
//! - [`dst`] -- DST gap policies and full-day windows in site-local time
//! - [`index`] -- per-resource interval index over appointments and blocks
//! - [`conflict`] -- appointment conflict detection for candidate blocks
//! - [`service`] -- validate → check → commit orchestration
//! - [`store`] / [`memory`] -- repository interfaces and in-memory stores
//! - [`ical`] -- RRULE text export
//! - [`config`] / [`interrupt`] / [`error`] -- supporting types

pub mod config;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod ical;
pub mod index;
pub mod interrupt;
pub mod memory;
pub mod model;
pub mod rule;
pub mod service;
pub mod store;

pub use config::{EngineConfig, ExpandContext, HorizonCap, TimeZones};
pub use conflict::{find_conflicts, ConflictDetector, ConflictReport, OccurrenceConflict};
pub use dst::DstPolicy;
pub use error::{ExpandError, RuleError, SchedulingError};
pub use expander::{expand, expand_block, Occurrences};
pub use index::{IntervalIndex, Overlap, Sources};
pub use interrupt::{Deadline, Interrupt, NeverInterrupt};
pub use memory::{MemoryAppointments, MemoryBlockStore};
pub use model::{
    Appointment, AppointmentStatus, Block, BlockDefinition, BlockId, Occurrence, ResourceKey,
    ResourceRef, ResourceType, TimeWindow,
};
pub use rule::{RecurrenceDraft, RecurrenceKind, RecurrenceRule, Terminator, WeekdaySet};
pub use service::{BlockDraft, BlockPatch, BlockQuery, SchedulingService, VisibleBlock};
pub use store::{AppointmentSource, BlockFilter, BlockStore, StoreError};
