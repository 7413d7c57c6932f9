//! Scheduling service: validate → conflict check → commit.
//!
//! Each write walks the same typestate chain and stops at the first failure:
//!
//! ```text
//! BlockDraft --validate--> ValidBlock --check--> ClearedBlock --commit--> Block
//!      |                        |                      |
//!  InvalidRule /           ConflictFound           StoreError
//!  InvalidBlock
//! ```
//!
//! Nothing is written unless every earlier stage passed. The store re-checks
//! the resource revision at commit time, so a concurrent writer surfaces as a
//! transient [`StoreError::ConcurrentWrite`](crate::store::StoreError) rather
//! than a silent double booking. The core never retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, TimeZones};
use crate::conflict::{ConflictDetector, ConflictReport};
use crate::dst;
use crate::error::{ExpandError, Result, SchedulingError};
use crate::expander;
use crate::index::IntervalIndex;
use crate::interrupt::Interrupt;
use crate::model::{Block, BlockDefinition, BlockId, Occurrence, ResourceRef, ResourceType, TimeWindow};
use crate::rule::RecurrenceDraft;
use crate::store::{AppointmentSource, BlockFilter, BlockStore, Commit, Revision, StoreError};

/// A block as submitted by a caller, before any validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDraft {
    pub site_id: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub start: DateTime<Utc>,
    /// Ignored for full-day blocks, which always cover the start's local day.
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub is_full_day: bool,
    pub reason: String,
    #[serde(default)]
    pub recurrence: Option<RecurrenceDraft>,
}

impl BlockDraft {
    /// Draft → RuleValid. Normalizes full-day windows to the site-local day.
    pub fn validate(self, zones: &TimeZones, block_id: Option<BlockId>) -> Result<ValidBlock> {
        if self.site_id.trim().is_empty() {
            return Err(SchedulingError::invalid_block("site_id", "is required"));
        }
        if self.resource_id.trim().is_empty() {
            return Err(SchedulingError::invalid_block("resource_id", "is required"));
        }
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(SchedulingError::invalid_block("reason", "is required"));
        }

        let tz = zones.for_site(&self.site_id);
        let window = if self.is_full_day {
            dst::normalize_full_day(&tz, self.start).ok_or_else(|| {
                SchedulingError::invalid_block("window", "start date is out of range")
            })?
        } else {
            let window = TimeWindow::new(self.start, self.end);
            if !window.is_valid() {
                return Err(SchedulingError::invalid_block(
                    "window",
                    "end must be after start",
                ));
            }
            window
        };

        let base_date = dst::local_date(&tz, window.start);
        let recurrence = self
            .recurrence
            .as_ref()
            .map(|draft| draft.validate(base_date))
            .transpose()?;

        Ok(ValidBlock {
            block_id,
            definition: BlockDefinition {
                site_id: self.site_id,
                resource_type: self.resource_type,
                resource_id: self.resource_id,
                window,
                is_full_day: self.is_full_day,
                reason: reason.to_string(),
                recurrence,
            },
        })
    }

    pub fn apply(mut self, patch: BlockPatch) -> Self {
        if let Some(site_id) = patch.site_id {
            self.site_id = site_id;
        }
        if let Some(resource_type) = patch.resource_type {
            self.resource_type = resource_type;
        }
        if let Some(resource_id) = patch.resource_id {
            self.resource_id = resource_id;
        }
        if let Some(start) = patch.start {
            self.start = start;
        }
        if let Some(end) = patch.end {
            self.end = end;
        }
        if let Some(is_full_day) = patch.is_full_day {
            self.is_full_day = is_full_day;
        }
        if let Some(reason) = patch.reason {
            self.reason = reason;
        }
        if let Some(recurrence) = patch.recurrence {
            self.recurrence = recurrence;
        }
        self
    }
}

impl From<&Block> for BlockDraft {
    fn from(block: &Block) -> Self {
        let def = &block.definition;
        Self {
            site_id: def.site_id.clone(),
            resource_type: def.resource_type,
            resource_id: def.resource_id.clone(),
            start: def.window.start,
            end: def.window.end,
            is_full_day: def.is_full_day,
            reason: def.reason.clone(),
            recurrence: def.recurrence.as_ref().map(RecurrenceDraft::from),
        }
    }
}

/// Partial update. `recurrence: Some(None)` removes the rule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BlockPatch {
    pub site_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub is_full_day: Option<bool>,
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub recurrence: Option<Option<RecurrenceDraft>>,
}

/// Distinguishes an explicit `null` (remove) from an absent field (keep).
pub fn present_or_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A definition whose fields and recurrence rule passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBlock {
    block_id: Option<BlockId>,
    definition: BlockDefinition,
}

impl ValidBlock {
    pub fn definition(&self) -> &BlockDefinition {
        &self.definition
    }

    /// RuleValid → NoConflict, or `ConflictFound` with the full report.
    pub fn check(self, detector: &ConflictDetector<'_>) -> Result<ClearedBlock> {
        let report = detector.check(self.block_id, &self.definition)?;
        if report.has_conflict {
            return Err(SchedulingError::ConflictFound(report));
        }
        Ok(ClearedBlock {
            block_id: self.block_id,
            definition: self.definition,
        })
    }
}

/// A definition that passed the conflict check and may be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearedBlock {
    block_id: Option<BlockId>,
    definition: BlockDefinition,
}

impl ClearedBlock {
    pub fn block_id(&self) -> Option<BlockId> {
        self.block_id
    }

    pub fn definition(&self) -> &BlockDefinition {
        &self.definition
    }

    fn into_commit(
        self,
        expected_revision: Revision,
        previous_revision: Option<Revision>,
        actor: &str,
    ) -> Commit {
        Commit {
            definition: self.definition,
            expected_revision,
            previous_revision,
            actor: actor.to_string(),
            at: Utc::now(),
        }
    }
}

/// Range query for visible blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockQuery {
    pub window: TimeWindow,
    pub filter: BlockFilter,
}

/// A block with at least one occurrence in the queried window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleBlock {
    pub block: Block,
    pub occurrences: Vec<Occurrence>,
}

/// Orchestrates validation, conflict detection and persistence.
#[derive(Clone)]
pub struct SchedulingService {
    store: Arc<dyn BlockStore>,
    appointments: Arc<dyn AppointmentSource>,
    config: Arc<EngineConfig>,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn BlockStore>,
        appointments: Arc<dyn AppointmentSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            appointments,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn create(
        &self,
        draft: BlockDraft,
        actor: &str,
        interrupt: &dyn Interrupt,
    ) -> Result<Block> {
        let valid = draft.validate(&self.config.zones, None)?;
        debug!(resource = %valid.definition.resource(), "Block rule valid");

        let (cleared, revision) = self.clear(valid, interrupt).await?;
        let block = self
            .store
            .insert(cleared.into_commit(revision, None, actor))
            .await
            .inspect_err(|e| warn!(error = %e, "Block commit rejected by store"))?;

        info!(
            block_id = %block.id,
            resource = %block.definition.resource(),
            site_id = %block.definition.site_id,
            recurring = block.definition.recurrence.is_some(),
            actor,
            "Block created"
        );
        Ok(block)
    }

    /// Merge `patch` over the stored definition and re-run the whole pipeline,
    /// excluding the block's own prior occurrences.
    pub async fn update(
        &self,
        id: BlockId,
        patch: BlockPatch,
        actor: &str,
        interrupt: &dyn Interrupt,
    ) -> Result<Block> {
        let stored = self
            .store
            .get(id)
            .await?
            .ok_or(SchedulingError::NotFound(id))?;

        // Re-read the block inside its key's snapshot so the edit is based on
        // exactly the state that `origin_revision` describes.
        let origin_key = stored.definition.key();
        let origin = self.store.snapshot(&origin_key).await?;
        let origin_revision = origin.revision;
        let existing = origin
            .blocks
            .into_iter()
            .find(|b| b.id == id && b.definition.key() == origin_key)
            .ok_or_else(|| {
                SchedulingError::Store(StoreError::ConcurrentWrite {
                    key: origin_key.to_string(),
                    expected: origin_revision,
                    found: origin_revision,
                })
            })?;

        let valid = BlockDraft::from(&existing)
            .apply(patch)
            .validate(&self.config.zones, Some(id))?;
        debug!(block_id = %id, "Block rule valid");

        let (cleared, revision) = self.clear(valid, interrupt).await?;
        let block = self
            .store
            .replace(id, cleared.into_commit(revision, Some(origin_revision), actor))
            .await
            .inspect_err(|e| warn!(block_id = %id, error = %e, "Block update rejected by store"))?;

        info!(block_id = %id, actor, "Block updated");
        Ok(block)
    }

    pub async fn delete(&self, id: BlockId) -> Result<()> {
        if !self.store.remove(id).await? {
            return Err(SchedulingError::NotFound(id));
        }
        info!(block_id = %id, "Block deleted");
        Ok(())
    }

    pub async fn get(&self, id: BlockId) -> Result<Block> {
        self.store
            .get(id)
            .await?
            .ok_or(SchedulingError::NotFound(id))
    }

    /// Blocks with at least one occurrence in the query window, with those occurrences.
    pub async fn list(
        &self,
        query: &BlockQuery,
        interrupt: &dyn Interrupt,
    ) -> Result<Vec<VisibleBlock>> {
        if !query.window.is_valid() {
            return Err(SchedulingError::invalid_block(
                "window",
                "range end must be after range start",
            ));
        }
        let blocks = self.store.list(&query.filter).await?;
        let ctx = self.config.context_with(interrupt);

        let mut visible = Vec::new();
        for block in blocks {
            let occurrences = expander::expand_block(&block, query.window, &ctx)
                .collect::<std::result::Result<Vec<Occurrence>, ExpandError>>()?;
            if !occurrences.is_empty() {
                visible.push(VisibleBlock { block, occurrences });
            }
        }
        debug!(window = %query.window, count = visible.len(), "Blocks listed");
        Ok(visible)
    }

    /// Single-interval, check-only conflict query. No recurrence, no commit.
    pub async fn check_conflict(
        &self,
        resource: &ResourceRef,
        window: TimeWindow,
    ) -> Result<ConflictReport> {
        if !window.is_valid() {
            return Err(SchedulingError::invalid_block(
                "window",
                "end must be after start",
            ));
        }
        let appointments = self.appointments.appointments(resource, window).await?;
        let index = IntervalIndex::from_parts(appointments, Vec::new());
        let detector = ConflictDetector::new(&index, &self.config, self.config.context());
        Ok(detector.check_interval(resource, window))
    }

    /// Check-only mode for a full (possibly recurring) draft: validates and
    /// reports conflicts without committing. `exclude` is the id of the block
    /// being edited, if any.
    pub async fn check_block(
        &self,
        draft: BlockDraft,
        exclude: Option<BlockId>,
        interrupt: &dyn Interrupt,
    ) -> Result<ConflictReport> {
        let valid = draft.validate(&self.config.zones, exclude)?;
        let (index, _) = self.load_index(valid.definition()).await?;
        let ctx = self.config.context_with(interrupt);
        let detector = ConflictDetector::new(&index, &self.config, ctx);
        Ok(detector.check(exclude, valid.definition())?)
    }

    async fn load_index(&self, definition: &BlockDefinition) -> Result<(IntervalIndex, Revision)> {
        let horizon = self.config.appointment_window(&definition.window);
        let snapshot = self.store.snapshot(&definition.key()).await?;
        let appointments = self
            .appointments
            .appointments(&definition.resource(), horizon)
            .await?;
        Ok((
            IntervalIndex::from_parts(appointments, snapshot.blocks),
            snapshot.revision,
        ))
    }

    /// RuleValid → NoConflict. Returns the revision the check ran against.
    async fn clear(
        &self,
        valid: ValidBlock,
        interrupt: &dyn Interrupt,
    ) -> Result<(ClearedBlock, Revision)> {
        let (index, revision) = self.load_index(valid.definition()).await?;
        let ctx = self.config.context_with(interrupt);
        let detector = ConflictDetector::new(&index, &self.config, ctx);

        let stacked = detector.block_overlaps(valid.block_id, valid.definition())?;
        if !stacked.is_empty() {
            info!(
                resource = %valid.definition().resource(),
                overlaps = stacked.len(),
                "Block overlaps other blocks of the same resource"
            );
        }

        let block_id = valid.block_id;
        let cleared = valid.check(&detector).inspect_err(|e| {
            if let SchedulingError::ConflictFound(report) = e {
                warn!(
                    block_id = ?block_id,
                    occurrences = report.conflicts.len(),
                    appointments = report.appointment_ids().len(),
                    "Block rejected: appointment conflict"
                );
            }
        })?;
        debug!(block_id = ?block_id, "Block has no conflicts");
        Ok((cleared, revision))
    }
}
