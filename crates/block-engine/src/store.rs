//! Repository interfaces for the collaborators the core reads from and writes to.
//!
//! The [`BlockStore`] is the serialization point for writes: each
//! [`ResourceKey`] carries a [`Revision`] that increases on every committed
//! change for that key. Callers read the revision together with the blocks
//! they check against, and pass it back on commit; a store must reject the
//! commit with [`StoreError::ConcurrentWrite`] if the revision moved in
//! between. How the store enforces that (row locks, transactions, a mutex) is
//! its own business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Appointment, Block, BlockDefinition, BlockId, ResourceKey, ResourceRef, ResourceType, TimeWindow};

/// Monotonic per-resource write counter.
pub type Revision = u64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Another writer committed for the same resource after the conflict check.
    #[error("Concurrent write on {key}: checked at revision {expected}, store is at {found}")]
    ConcurrentWrite {
        key: String,
        expected: Revision,
        found: Revision,
    },

    #[error("Block {0} not found")]
    NotFound(BlockId),

    /// The backend could not be reached; the operation may succeed if retried.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrentWrite { .. } | StoreError::Unavailable(_)
        )
    }
}

/// Filters for listing block definitions. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockFilter {
    pub site_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<String>,
}

impl BlockFilter {
    pub fn matches(&self, definition: &BlockDefinition) -> bool {
        self.site_id.as_ref().is_none_or(|s| *s == definition.site_id)
            && self
                .resource_type
                .is_none_or(|t| t == definition.resource_type)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|r| *r == definition.resource_id)
    }
}

/// The blocks stored for one resource key, read at a known revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSnapshot {
    pub revision: Revision,
    /// Every block of the key's resource, across all sites.
    pub blocks: Vec<Block>,
}

/// What the store needs to persist a checked definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub definition: BlockDefinition,
    /// Revision of `definition.key()` the conflict check ran against.
    pub expected_revision: Revision,
    /// Replacements only: revision of the key the block was stored under when
    /// it was read. Checked as well when an update moves the block to another
    /// site or resource, so edits under the old key are not lost.
    pub previous_revision: Option<Revision>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get(&self, id: BlockId) -> Result<Option<Block>, StoreError>;

    async fn list(&self, filter: &BlockFilter) -> Result<Vec<Block>, StoreError>;

    async fn snapshot(&self, key: &ResourceKey) -> Result<ResourceSnapshot, StoreError>;

    /// Insert a new block; the store assigns its id and provenance.
    async fn insert(&self, commit: Commit) -> Result<Block, StoreError>;

    /// Replace the definition of an existing block. `created_*` is preserved.
    /// Both `expected_revision` and `previous_revision` must still hold.
    async fn replace(&self, id: BlockId, commit: Commit) -> Result<Block, StoreError>;

    /// Returns `false` when no block had this id.
    async fn remove(&self, id: BlockId) -> Result<bool, StoreError>;
}

/// Read access to the booking system's appointments.
#[async_trait]
pub trait AppointmentSource: Send + Sync {
    /// Appointments of `resource` overlapping `window`. Implementations may
    /// return inactive ones; the index filters them out.
    async fn appointments(
        &self,
        resource: &ResourceRef,
        window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError>;
}
