//! Error types for block-engine operations.

use serde::Serialize;
use thiserror::Error;

use crate::conflict::ConflictReport;
use crate::model::BlockId;
use crate::store::StoreError;

/// A malformed recurrence rule or block field, naming the field that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{field}: {message}")]
pub struct RuleError {
    pub field: &'static str,
    pub message: String,
}

impl RuleError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised while expanding a block into occurrences.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpandError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(RuleError),

    #[error("Expansion interrupted")]
    Interrupted,
}

/// Errors surfaced by the scheduling pipeline (validate → check → commit).
#[derive(Error, Debug)]
pub enum SchedulingError {
    /// The recurrence rule is malformed. Never worth retrying.
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(RuleError),

    /// A block field other than the recurrence rule is malformed.
    #[error("Invalid block {field}: {message}")]
    InvalidBlock {
        field: &'static str,
        message: String,
    },

    /// One or more occurrences overlap an active appointment.
    #[error("Block overlaps {} appointment(s) in {} occurrence(s)", .0.appointment_ids().len(), .0.conflicts.len())]
    ConflictFound(ConflictReport),

    #[error(transparent)]
    Store(StoreError),

    #[error("Block {0} not found")]
    NotFound(BlockId),

    #[error("Operation interrupted before completion")]
    Interrupted,
}

impl SchedulingError {
    /// Whether the caller may retry the whole validate → commit sequence once.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulingError::Store(e) if e.is_transient())
    }

    pub(crate) fn invalid_block(field: &'static str, message: impl Into<String>) -> Self {
        SchedulingError::InvalidBlock {
            field,
            message: message.into(),
        }
    }
}

impl From<RuleError> for SchedulingError {
    fn from(e: RuleError) -> Self {
        SchedulingError::InvalidRule(e)
    }
}

impl From<ExpandError> for SchedulingError {
    fn from(e: ExpandError) -> Self {
        match e {
            ExpandError::InvalidRule(rule) => SchedulingError::InvalidRule(rule),
            ExpandError::Interrupted => SchedulingError::Interrupted,
        }
    }
}

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SchedulingError::NotFound(id),
            other => SchedulingError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulingError>;
