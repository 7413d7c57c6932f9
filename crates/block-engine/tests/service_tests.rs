//! Tests for the scheduling service: validate → check → commit, against the
//! in-memory stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use block_engine::config::{EngineConfig, TimeZones};
use block_engine::interrupt::NeverInterrupt;
use block_engine::memory::{MemoryAppointments, MemoryBlockStore};
use block_engine::model::{
    Appointment, AppointmentStatus, Block, BlockId, ResourceKey, ResourceRef, ResourceType,
    TimeWindow,
};
use block_engine::rule::{RecurrenceDraft, RecurrenceKind};
use block_engine::service::{BlockDraft, BlockPatch, BlockQuery, SchedulingService};
use block_engine::store::{
    AppointmentSource, BlockFilter, BlockStore, Commit, ResourceSnapshot, StoreError,
};
use block_engine::SchedulingError;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SITE: &str = "sede-centro";

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn draft(start: DateTime<Utc>, end: DateTime<Utc>) -> BlockDraft {
    BlockDraft {
        site_id: SITE.to_string(),
        resource_type: ResourceType::Practitioner,
        resource_id: "prof-x".to_string(),
        start,
        end,
        is_full_day: false,
        reason: "Capacitación".to_string(),
        recurrence: None,
    }
}

fn appointment(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
    Appointment {
        id: id.to_string(),
        resource_type: ResourceType::Practitioner,
        resource_id: "prof-x".to_string(),
        window: TimeWindow::new(start, end),
        status: AppointmentStatus::Confirmed,
    }
}

fn practitioner() -> ResourceRef {
    ResourceRef::new(ResourceType::Practitioner, "prof-x")
}

fn service_with(
    store: Arc<dyn BlockStore>,
    appointments: Vec<Appointment>,
    config: EngineConfig,
) -> SchedulingService {
    let appointments: MemoryAppointments = appointments.into_iter().collect();
    SchedulingService::new(store, Arc::new(appointments), config)
}

fn service(appointments: Vec<Appointment>) -> SchedulingService {
    service_with(
        Arc::new(MemoryBlockStore::new()),
        appointments,
        EngineConfig::default(),
    )
}

async fn all_blocks(service: &SchedulingService) -> usize {
    let query = BlockQuery {
        window: TimeWindow::unbounded(),
        filter: BlockFilter::default(),
    };
    service.list(&query, &NeverInterrupt).await.unwrap().len()
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_get_returns_stored_block() {
    let svc = service(Vec::new());

    let created = svc
        .create(draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();
    let fetched = svc.get(created.id).await.unwrap();

    assert_eq!(fetched, created);
    assert_eq!(fetched.created_by, "admin");
    assert_eq!(fetched.definition.reason, "Capacitación");
}

#[tokio::test]
async fn daily_block_lists_five_occurrences() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(5));

    svc.create(d, "admin", &NeverInterrupt).await.unwrap();
    let query = BlockQuery {
        window: TimeWindow::new(utc(2024, 1, 1, 0, 0), utc(2024, 2, 1, 0, 0)),
        filter: BlockFilter::default(),
    };
    let visible = svc.list(&query, &NeverInterrupt).await.unwrap();

    assert_eq!(visible.len(), 1);
    let starts: Vec<_> = visible[0].occurrences.iter().map(|o| o.window.start).collect();
    assert_eq!(
        starts,
        (1..=5).map(|d| utc(2024, 1, d, 9, 0)).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn create_over_appointment_is_rejected_and_not_stored() {
    let svc = service(vec![appointment(
        "cita-1",
        utc(2024, 3, 10, 14, 30),
        utc(2024, 3, 10, 14, 45),
    )]);

    let err = svc
        .create(draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(&err, SchedulingError::ConflictFound(report) => {
        assert_eq!(report.appointment_ids(), vec!["cita-1"]);
    });
    assert!(!err.is_transient());
    assert_eq!(all_blocks(&svc).await, 0);
}

#[tokio::test]
async fn recurring_create_reports_later_conflicting_occurrence() {
    // Third weekly occurrence (2024-03-24) hits the appointment.
    let svc = service(vec![appointment(
        "cita-3",
        utc(2024, 3, 24, 14, 10),
        utc(2024, 3, 24, 14, 40),
    )]);
    let mut d = draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0));
    d.recurrence = Some(
        RecurrenceDraft::new(RecurrenceKind::Weekly)
            .by_weekday([0])
            .count(6),
    );

    let err = svc.create(d, "admin", &NeverInterrupt).await.unwrap_err();

    assert_matches!(err, SchedulingError::ConflictFound(report) => {
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].occurrence.index, 2);
    });
}

#[tokio::test]
async fn cancelled_and_touching_appointments_do_not_block() {
    let mut cancelled = appointment("cita-c", utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0));
    cancelled.status = AppointmentStatus::Cancelled;
    let touching = appointment("cita-t", utc(2024, 3, 10, 15, 0), utc(2024, 3, 10, 15, 30));
    let svc = service(vec![cancelled, touching]);

    let result = svc
        .create(draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0)), "admin", &NeverInterrupt)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn invalid_rule_is_rejected_before_any_write() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Weekly).count(4));

    let err = svc.create(d, "admin", &NeverInterrupt).await.unwrap_err();

    assert_matches!(err, SchedulingError::InvalidRule(e) if e.field == "by_weekday");
    assert_eq!(all_blocks(&svc).await, 0);
}

#[tokio::test]
async fn inverted_window_is_invalid_block() {
    let svc = service(Vec::new());

    let err = svc
        .create(draft(utc(2024, 3, 10, 15, 0), utc(2024, 3, 10, 14, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(err, SchedulingError::InvalidBlock { field: "window", .. });
}

#[tokio::test]
async fn blank_reason_is_invalid_block() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0));
    d.reason = "   ".to_string();

    let err = svc.create(d, "admin", &NeverInterrupt).await.unwrap_err();

    assert_matches!(err, SchedulingError::InvalidBlock { field: "reason", .. });
}

#[tokio::test]
async fn full_day_block_normalizes_in_site_zone() {
    let zones = TimeZones::new(Tz::UTC).with_site(SITE, chrono_tz::Europe::Madrid);
    let svc = service_with(
        Arc::new(MemoryBlockStore::new()),
        Vec::new(),
        EngineConfig::with_zones(zones),
    );
    let mut d = draft(utc(2024, 6, 1, 13, 37), utc(2024, 6, 1, 13, 38));
    d.is_full_day = true;

    let block = svc.create(d, "admin", &NeverInterrupt).await.unwrap();

    assert_eq!(block.definition.window.start, utc(2024, 5, 31, 22, 0));
    assert_eq!(block.definition.window.end, utc(2024, 6, 1, 22, 0));
}

#[tokio::test]
async fn last_occurrence_straddling_the_horizon_is_checked() {
    // 09:00-11:00 Madrid daily from 2024-03-30. The horizon ends at
    // 2025-03-30T08:00Z; after the spring-forward that day's occurrence is
    // 07:00-09:00Z and the appointment sits in its tail.
    let zones = TimeZones::new(Tz::UTC).with_site(SITE, chrono_tz::Europe::Madrid);
    let svc = service_with(
        Arc::new(MemoryBlockStore::new()),
        vec![appointment("cita-borde", utc(2025, 3, 30, 8, 15), utc(2025, 3, 30, 8, 45))],
        EngineConfig::with_zones(zones),
    );
    let mut d = draft(utc(2024, 3, 30, 8, 0), utc(2024, 3, 30, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(400));

    let err = svc.create(d, "admin", &NeverInterrupt).await.unwrap_err();

    assert_matches!(&err, SchedulingError::ConflictFound(report) => {
        assert_eq!(report.appointment_ids(), vec!["cita-borde"]);
        assert_eq!(report.conflicts[0].occurrence.window.start, utc(2025, 3, 30, 7, 0));
    });
    assert_eq!(all_blocks(&svc).await, 0);
}

#[tokio::test]
async fn raised_interrupt_aborts_create() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(300));
    let cancelled = AtomicBool::new(true);

    let err = svc.create(d, "admin", &cancelled).await.unwrap_err();

    assert_matches!(err, SchedulingError::Interrupted);
    assert_eq!(all_blocks(&svc).await, 0);
}

// ---------------------------------------------------------------------------
// Update / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_does_not_conflict_with_own_occurrences() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(10));
    let created = svc.create(d, "admin", &NeverInterrupt).await.unwrap();

    let patch = BlockPatch {
        reason: Some("Vacaciones".to_string()),
        ..BlockPatch::default()
    };
    let updated = svc
        .update(created.id, patch, "jefa", &NeverInterrupt)
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.definition.reason, "Vacaciones");
    assert_eq!(updated.definition.recurrence, created.definition.recurrence);
    assert_eq!(updated.created_by, "admin");
}

#[tokio::test]
async fn update_can_remove_recurrence() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(10));
    let created = svc.create(d, "admin", &NeverInterrupt).await.unwrap();

    let patch: BlockPatch = serde_json::from_str(r#"{ "recurrence": null }"#).unwrap();
    let updated = svc
        .update(created.id, patch, "admin", &NeverInterrupt)
        .await
        .unwrap();

    assert!(updated.definition.recurrence.is_none());
}

#[tokio::test]
async fn update_into_appointment_is_rejected_and_keeps_old_definition() {
    let svc = service(vec![appointment(
        "cita-1",
        utc(2024, 1, 2, 11, 0),
        utc(2024, 1, 2, 11, 30),
    )]);
    let created = svc
        .create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();

    let patch = BlockPatch {
        end: Some(utc(2024, 1, 2, 12, 0)),
        ..BlockPatch::default()
    };
    let err = svc
        .update(created.id, patch, "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(err, SchedulingError::ConflictFound(_));
    assert_eq!(svc.get(created.id).await.unwrap(), created);
}

#[tokio::test]
async fn update_of_unknown_block_is_not_found() {
    let svc = service(Vec::new());
    let id = BlockId::now_v7();

    let err = svc
        .update(id, BlockPatch::default(), "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(err, SchedulingError::NotFound(missing) if missing == id);
}

#[tokio::test]
async fn delete_removes_block_once() {
    let svc = service(Vec::new());
    let created = svc
        .create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();

    svc.delete(created.id).await.unwrap();

    assert_matches!(svc.get(created.id).await, Err(SchedulingError::NotFound(_)));
    assert_matches!(svc.delete(created.id).await, Err(SchedulingError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Listing and check-only queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_filters_by_resource_and_window() {
    let svc = service(Vec::new());
    svc.create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();
    let mut room = draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0));
    room.resource_type = ResourceType::Room;
    room.resource_id = "sala-2".to_string();
    svc.create(room, "admin", &NeverInterrupt).await.unwrap();

    let rooms = BlockQuery {
        window: TimeWindow::new(utc(2024, 1, 1, 0, 0), utc(2024, 1, 3, 0, 0)),
        filter: BlockFilter {
            resource_type: Some(ResourceType::Room),
            ..BlockFilter::default()
        },
    };
    let later = BlockQuery {
        window: TimeWindow::new(utc(2024, 2, 1, 0, 0), utc(2024, 3, 1, 0, 0)),
        filter: BlockFilter::default(),
    };

    let visible = svc.list(&rooms, &NeverInterrupt).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].block.definition.resource_id, "sala-2");
    assert!(svc.list(&later, &NeverInterrupt).await.unwrap().is_empty());
}

#[tokio::test]
async fn check_conflict_reports_overlapping_appointment() {
    let svc = service(vec![appointment(
        "cita-1",
        utc(2024, 3, 10, 14, 30),
        utc(2024, 3, 10, 14, 45),
    )]);

    let report = svc
        .check_conflict(
            &practitioner(),
            TimeWindow::new(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 15, 0)),
        )
        .await
        .unwrap();

    assert!(report.has_conflict);
    assert_eq!(report.appointment_ids(), vec!["cita-1"]);
}

#[tokio::test]
async fn check_block_never_writes() {
    let svc = service(Vec::new());
    let mut d = draft(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0));
    d.recurrence = Some(RecurrenceDraft::new(RecurrenceKind::Daily).count(3));

    let report = svc.check_block(d, None, &NeverInterrupt).await.unwrap();

    assert!(!report.has_conflict);
    assert_eq!(all_blocks(&svc).await, 0);
}

// ---------------------------------------------------------------------------
// Collaborator failures
// ---------------------------------------------------------------------------

/// Lets a competing writer commit between the snapshot and the insert.
struct RacingStore {
    inner: MemoryBlockStore,
    raced: AtomicBool,
}

#[async_trait]
impl BlockStore for RacingStore {
    async fn get(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &BlockFilter) -> Result<Vec<Block>, StoreError> {
        self.inner.list(filter).await
    }

    async fn snapshot(&self, key: &ResourceKey) -> Result<ResourceSnapshot, StoreError> {
        let snapshot = self.inner.snapshot(key).await?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            let competing = Commit {
                definition: draft(utc(2030, 1, 1, 9, 0), utc(2030, 1, 1, 10, 0))
                    .validate(&TimeZones::default(), None)
                    .unwrap()
                    .definition()
                    .clone(),
                expected_revision: snapshot.revision,
                previous_revision: None,
                actor: "other-admin".to_string(),
                at: Utc::now(),
            };
            self.inner.insert(competing).await?;
        }
        Ok(snapshot)
    }

    async fn insert(&self, commit: Commit) -> Result<Block, StoreError> {
        self.inner.insert(commit).await
    }

    async fn replace(&self, id: BlockId, commit: Commit) -> Result<Block, StoreError> {
        self.inner.replace(id, commit).await
    }

    async fn remove(&self, id: BlockId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }
}

#[tokio::test]
async fn concurrent_writer_surfaces_as_transient_store_error() {
    let store = Arc::new(RacingStore {
        inner: MemoryBlockStore::new(),
        raced: AtomicBool::new(false),
    });
    let svc = service_with(store, Vec::new(), EngineConfig::default());

    let err = svc
        .create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(
        &err,
        SchedulingError::Store(StoreError::ConcurrentWrite { expected: 0, found: 1, .. })
    );
    assert!(err.is_transient());

    // One retry from the caller goes through.
    svc.create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();
}

/// Commits an edit of every block under the old resource while a move to
/// `destination` is being checked.
struct EditDuringMove {
    inner: MemoryBlockStore,
    destination: &'static str,
    raced: AtomicBool,
}

#[async_trait]
impl BlockStore for EditDuringMove {
    async fn get(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &BlockFilter) -> Result<Vec<Block>, StoreError> {
        self.inner.list(filter).await
    }

    async fn snapshot(&self, key: &ResourceKey) -> Result<ResourceSnapshot, StoreError> {
        if key.resource.resource_id == self.destination && !self.raced.swap(true, Ordering::SeqCst) {
            let origin_key = ResourceKey {
                site_id: SITE.to_string(),
                resource: practitioner(),
            };
            let origin = self.inner.snapshot(&origin_key).await?;
            for block in origin.blocks {
                let mut definition = block.definition.clone();
                definition.reason = "Editada en paralelo".to_string();
                let revision = self.inner.snapshot(&origin_key).await?.revision;
                let edit = Commit {
                    definition,
                    expected_revision: revision,
                    previous_revision: Some(revision),
                    actor: "other-admin".to_string(),
                    at: Utc::now(),
                };
                self.inner.replace(block.id, edit).await?;
            }
        }
        self.inner.snapshot(key).await
    }

    async fn insert(&self, commit: Commit) -> Result<Block, StoreError> {
        self.inner.insert(commit).await
    }

    async fn replace(&self, id: BlockId, commit: Commit) -> Result<Block, StoreError> {
        self.inner.replace(id, commit).await
    }

    async fn remove(&self, id: BlockId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }
}

#[tokio::test]
async fn moving_a_block_detects_an_edit_under_its_old_resource() {
    let store = Arc::new(EditDuringMove {
        inner: MemoryBlockStore::new(),
        destination: "prof-y",
        raced: AtomicBool::new(false),
    });
    let svc = service_with(store, Vec::new(), EngineConfig::default());
    let created = svc
        .create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap();

    let patch = BlockPatch {
        resource_id: Some("prof-y".to_string()),
        ..BlockPatch::default()
    };
    let err = svc
        .update(created.id, patch, "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(
        &err,
        SchedulingError::Store(StoreError::ConcurrentWrite { key, .. }) if key.ends_with("prof-x")
    );
    assert!(err.is_transient());
    // The competing edit survives and the block has not moved.
    let kept = svc.get(created.id).await.unwrap();
    assert_eq!(kept.definition.resource_id, "prof-x");
    assert_eq!(kept.definition.reason, "Editada en paralelo");
}

#[tokio::test]
async fn stale_read_revision_rejects_a_replace() {
    let store = MemoryBlockStore::new();
    let definition = draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0))
        .validate(&TimeZones::default(), None)
        .unwrap()
        .definition()
        .clone();
    let commit = |definition, expected_revision, previous_revision| Commit {
        definition,
        expected_revision,
        previous_revision,
        actor: "admin".to_string(),
        at: Utc::now(),
    };
    let block = store.insert(commit(definition.clone(), 0, None)).await.unwrap();
    // Another block on the same resource moves its revision to 2.
    store.insert(commit(definition.clone(), 1, None)).await.unwrap();

    let mut moved = definition;
    moved.resource_id = "prof-y".to_string();
    let err = store
        .replace(block.id, commit(moved, 0, Some(1)))
        .await
        .unwrap_err();

    assert_matches!(err, StoreError::ConcurrentWrite { expected: 1, found: 2, .. });
    assert_eq!(store.get(block.id).await.unwrap().unwrap().definition.resource_id, "prof-x");
}

struct UnreachableAppointments;

#[async_trait]
impl AppointmentSource for UnreachableAppointments {
    async fn appointments(
        &self,
        _resource: &ResourceRef,
        _window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError> {
        Err(StoreError::Unavailable("booking database offline".to_string()))
    }
}

#[tokio::test]
async fn unreachable_appointment_source_is_not_treated_as_empty() {
    let svc = SchedulingService::new(
        Arc::new(MemoryBlockStore::new()),
        Arc::new(UnreachableAppointments),
        EngineConfig::default(),
    );

    let err = svc
        .create(draft(utc(2024, 1, 2, 9, 0), utc(2024, 1, 2, 10, 0)), "admin", &NeverInterrupt)
        .await
        .unwrap_err();

    assert_matches!(err, SchedulingError::Store(StoreError::Unavailable(_)));
    assert_eq!(all_blocks(&svc).await, 0);
}

