//! In-memory implementations of [`BlockStore`] and [`AppointmentSource`].
//!
//! Used by the HTTP server when no external store is configured, and by tests.
//! All writes go through one mutex, which also makes the revision check and
//! the write a single atomic step.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Appointment, Block, BlockId, ResourceKey, ResourceRef, TimeWindow};
use crate::store::{
    AppointmentSource, BlockFilter, BlockStore, Commit, ResourceSnapshot, Revision, StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    blocks: BTreeMap<BlockId, Block>,
    revisions: HashMap<ResourceKey, Revision>,
}

impl Tables {
    fn revision(&self, key: &ResourceKey) -> Revision {
        self.revisions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: ResourceKey) {
        *self.revisions.entry(key).or_insert(0) += 1;
    }

    fn expect_revision(&self, key: &ResourceKey, expected: Revision) -> Result<(), StoreError> {
        let found = self.revision(key);
        if found != expected {
            return Err(StoreError::ConcurrentWrite {
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    tables: Mutex<Tables>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("block table lock poisoned".to_string()))
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        Ok(self.lock()?.blocks.get(&id).cloned())
    }

    async fn list(&self, filter: &BlockFilter) -> Result<Vec<Block>, StoreError> {
        let tables = self.lock()?;
        let mut blocks: Vec<Block> = tables
            .blocks
            .values()
            .filter(|b| filter.matches(&b.definition))
            .cloned()
            .collect();
        blocks.sort_by_key(|b| (b.definition.window.start, b.id));
        Ok(blocks)
    }

    async fn snapshot(&self, key: &ResourceKey) -> Result<ResourceSnapshot, StoreError> {
        let tables = self.lock()?;
        Ok(ResourceSnapshot {
            revision: tables.revision(key),
            blocks: tables
                .blocks
                .values()
                .filter(|b| b.definition.resource() == key.resource)
                .cloned()
                .collect(),
        })
    }

    async fn insert(&self, commit: Commit) -> Result<Block, StoreError> {
        let mut tables = self.lock()?;
        let key = commit.definition.key();
        tables.expect_revision(&key, commit.expected_revision)?;

        let block = Block {
            id: Uuid::now_v7(),
            definition: commit.definition,
            created_by: commit.actor,
            created_at: commit.at,
            updated_at: commit.at,
        };
        tables.blocks.insert(block.id, block.clone());
        tables.bump(key);
        Ok(block)
    }

    async fn replace(&self, id: BlockId, commit: Commit) -> Result<Block, StoreError> {
        let mut tables = self.lock()?;
        let previous_key = tables
            .blocks
            .get(&id)
            .map(|b| b.definition.key())
            .ok_or(StoreError::NotFound(id))?;
        if let Some(previous) = commit.previous_revision {
            tables.expect_revision(&previous_key, previous)?;
        }
        let key = commit.definition.key();
        tables.expect_revision(&key, commit.expected_revision)?;

        let Some(block) = tables.blocks.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        block.definition = commit.definition;
        block.updated_at = commit.at;
        let updated = block.clone();

        if previous_key != key {
            tables.bump(previous_key);
        }
        tables.bump(key);
        Ok(updated)
    }

    async fn remove(&self, id: BlockId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.blocks.remove(&id) {
            Some(block) => {
                tables.bump(block.definition.key());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Appointment source backed by a vector per resource.
#[derive(Debug, Default)]
pub struct MemoryAppointments {
    by_resource: RwLock<HashMap<ResourceRef, Vec<Appointment>>>,
}

impl MemoryAppointments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, appointment: Appointment) -> Result<(), StoreError> {
        self.by_resource
            .write()
            .map_err(|_| StoreError::Backend("appointment table lock poisoned".to_string()))?
            .entry(appointment.resource())
            .or_default()
            .push(appointment);
        Ok(())
    }
}

impl FromIterator<Appointment> for MemoryAppointments {
    fn from_iter<I: IntoIterator<Item = Appointment>>(iter: I) -> Self {
        let mut by_resource: HashMap<ResourceRef, Vec<Appointment>> = HashMap::new();
        for appointment in iter {
            by_resource
                .entry(appointment.resource())
                .or_default()
                .push(appointment);
        }
        Self {
            by_resource: RwLock::new(by_resource),
        }
    }
}

#[async_trait]
impl AppointmentSource for MemoryAppointments {
    async fn appointments(
        &self,
        resource: &ResourceRef,
        window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError> {
        let by_resource = self
            .by_resource
            .read()
            .map_err(|_| StoreError::Backend("appointment table lock poisoned".to_string()))?;
        Ok(by_resource
            .get(resource)
            .map(|list| {
                list.iter()
                    .filter(|a| a.window.overlaps(&window))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
