//! Wire types for `/api/v1/bloqueos`.
//!
//! The booking front end speaks camelCase Spanish; the engine speaks its own
//! model. Every conversion between the two lives here so handlers stay thin.
//! Resource and recurrence kinds accept the English spellings as well.

use block_engine::{
    Block, BlockDraft, BlockFilter, BlockPatch, Occurrence, OccurrenceConflict, RecurrenceDraft,
    RecurrenceKind, ResourceRef, ResourceType, TimeWindow, VisibleBlock,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seed::Directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoRecurso {
    #[serde(rename = "SALA", alias = "ROOM")]
    Sala,
    #[serde(rename = "PROFESIONAL", alias = "PRACTITIONER")]
    Profesional,
}

impl From<TipoRecurso> for ResourceType {
    fn from(tipo: TipoRecurso) -> Self {
        match tipo {
            TipoRecurso::Sala => ResourceType::Room,
            TipoRecurso::Profesional => ResourceType::Practitioner,
        }
    }
}

impl From<ResourceType> for TipoRecurso {
    fn from(resource_type: ResourceType) -> Self {
        match resource_type {
            ResourceType::Room => TipoRecurso::Sala,
            ResourceType::Practitioner => TipoRecurso::Profesional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoRecurrencia {
    #[serde(rename = "DIARIA", alias = "DAILY")]
    Diaria,
    #[serde(rename = "SEMANAL", alias = "WEEKLY")]
    Semanal,
    #[serde(rename = "MENSUAL", alias = "MONTHLY")]
    Mensual,
}

impl From<TipoRecurrencia> for RecurrenceKind {
    fn from(tipo: TipoRecurrencia) -> Self {
        match tipo {
            TipoRecurrencia::Diaria => RecurrenceKind::Daily,
            TipoRecurrencia::Semanal => RecurrenceKind::Weekly,
            TipoRecurrencia::Mensual => RecurrenceKind::Monthly,
        }
    }
}

impl From<RecurrenceKind> for TipoRecurrencia {
    fn from(kind: RecurrenceKind) -> Self {
        match kind {
            RecurrenceKind::Daily => TipoRecurrencia::Diaria,
            RecurrenceKind::Weekly => TipoRecurrencia::Semanal,
            RecurrenceKind::Monthly => TipoRecurrencia::Mensual,
        }
    }
}

/// Recurrence as the form submits it. Loosely typed on purpose: the engine
/// reports which field is wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenciaDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<TipoRecurrencia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervalo: Option<i64>,
    /// Last site-local date an occurrence may fall on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeticiones: Option<i64>,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dias_semana: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dia_mes: Option<i64>,
}

impl From<RecurrenciaDto> for RecurrenceDraft {
    fn from(dto: RecurrenciaDto) -> Self {
        RecurrenceDraft {
            kind: dto.tipo.map(RecurrenceKind::from),
            interval: dto.intervalo,
            until: dto.fecha_fin,
            count: dto.repeticiones,
            by_weekday: dto.dias_semana,
            by_month_day: dto.dia_mes,
        }
    }
}

impl From<RecurrenceDraft> for RecurrenciaDto {
    fn from(draft: RecurrenceDraft) -> Self {
        RecurrenciaDto {
            tipo: draft.kind.map(TipoRecurrencia::from),
            intervalo: draft.interval,
            fecha_fin: draft.until,
            repeticiones: draft.count,
            dias_semana: draft.by_weekday,
            dia_mes: draft.by_month_day,
        }
    }
}

/// Body of `POST /bloqueos`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloqueoInput {
    pub sede_id: String,
    pub tipo: TipoRecurso,
    pub recurso_id: String,
    pub fecha_inicio: DateTime<Utc>,
    /// May be omitted for full-day blocks.
    #[serde(default)]
    pub fecha_fin: Option<DateTime<Utc>>,
    #[serde(default)]
    pub todo_el_dia: bool,
    #[serde(default)]
    pub motivo: String,
    #[serde(default)]
    pub recurrencia: Option<RecurrenciaDto>,
}

impl From<BloqueoInput> for BlockDraft {
    fn from(input: BloqueoInput) -> Self {
        BlockDraft {
            site_id: input.sede_id,
            resource_type: input.tipo.into(),
            resource_id: input.recurso_id,
            start: input.fecha_inicio,
            end: input.fecha_fin.unwrap_or(input.fecha_inicio),
            is_full_day: input.todo_el_dia,
            reason: input.motivo,
            recurrence: input.recurrencia.map(RecurrenceDraft::from),
        }
    }
}

/// Body of `PUT /bloqueos/{id}`. Absent fields keep their stored value;
/// `"recurrencia": null` turns a recurring block into a single one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloqueoPatch {
    pub sede_id: Option<String>,
    pub tipo: Option<TipoRecurso>,
    pub recurso_id: Option<String>,
    pub fecha_inicio: Option<DateTime<Utc>>,
    pub fecha_fin: Option<DateTime<Utc>>,
    pub todo_el_dia: Option<bool>,
    pub motivo: Option<String>,
    #[serde(default, deserialize_with = "block_engine::service::present_or_null")]
    pub recurrencia: Option<Option<RecurrenciaDto>>,
}

impl From<BloqueoPatch> for BlockPatch {
    fn from(patch: BloqueoPatch) -> Self {
        BlockPatch {
            site_id: patch.sede_id,
            resource_type: patch.tipo.map(ResourceType::from),
            resource_id: patch.recurso_id,
            start: patch.fecha_inicio,
            end: patch.fecha_fin,
            is_full_day: patch.todo_el_dia,
            reason: patch.motivo,
            recurrence: patch
                .recurrencia
                .map(|r| r.map(RecurrenceDraft::from)),
        }
    }
}

/// Query string of `GET /bloqueos`. A missing bound leaves that side open.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListaQuery {
    pub fecha_inicio: Option<DateTime<Utc>>,
    pub fecha_fin: Option<DateTime<Utc>>,
    pub sede_id: Option<String>,
    pub recurso_id: Option<String>,
    pub tipo: Option<TipoRecurso>,
}

impl ListaQuery {
    pub fn window(&self) -> TimeWindow {
        let open = TimeWindow::unbounded();
        TimeWindow::new(
            self.fecha_inicio.unwrap_or(open.start),
            self.fecha_fin.unwrap_or(open.end),
        )
    }

    pub fn filter(&self) -> BlockFilter {
        BlockFilter {
            site_id: self.sede_id.clone(),
            resource_type: self.tipo.map(ResourceType::from),
            resource_id: self.recurso_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcurrenciaDto {
    pub indice: u32,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: DateTime<Utc>,
}

impl From<&Occurrence> for OcurrenciaDto {
    fn from(occurrence: &Occurrence) -> Self {
        OcurrenciaDto {
            indice: occurrence.index,
            fecha_inicio: occurrence.window.start,
            fecha_fin: occurrence.window.end,
        }
    }
}

/// One conflicting occurrence and the appointments it overlaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictoDto {
    pub ocurrencia: OcurrenciaDto,
    pub citas: Vec<String>,
}

impl From<&OccurrenceConflict> for ConflictoDto {
    fn from(conflict: &OccurrenceConflict) -> Self {
        ConflictoDto {
            ocurrencia: OcurrenciaDto::from(&conflict.occurrence),
            citas: conflict.conflicting_appointment_ids.clone(),
        }
    }
}

/// A block as returned to clients, with site and resource names filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BloqueoDto {
    pub id: Uuid,
    pub sede_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sede_nombre: Option<String>,
    pub tipo: TipoRecurso,
    pub recurso_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurso_nombre: Option<String>,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: DateTime<Utc>,
    pub todo_el_dia: bool,
    pub motivo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrencia: Option<RecurrenciaDto>,
    /// RFC 5545 rendering of the recurrence, for calendar clients.
    pub rrule: String,
    pub creado_por: String,
    pub creado_en: DateTime<Utc>,
    pub actualizado_en: DateTime<Utc>,
    /// Occurrences inside the queried window; only present on listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocurrencias: Option<Vec<OcurrenciaDto>>,
}

impl BloqueoDto {
    pub fn new(block: &Block, directory: &Directory, rrule: String) -> Self {
        let def = &block.definition;
        BloqueoDto {
            id: block.id,
            sede_id: def.site_id.clone(),
            sede_nombre: directory.site_name(&def.site_id).map(str::to_string),
            tipo: def.resource_type.into(),
            recurso_id: def.resource_id.clone(),
            recurso_nombre: directory.resource_name(&def.resource()).map(str::to_string),
            fecha_inicio: def.window.start,
            fecha_fin: def.window.end,
            todo_el_dia: def.is_full_day,
            motivo: def.reason.clone(),
            recurrencia: def
                .recurrence
                .as_ref()
                .map(|rule| RecurrenciaDto::from(RecurrenceDraft::from(rule))),
            rrule,
            creado_por: block.created_by.clone(),
            creado_en: block.created_at,
            actualizado_en: block.updated_at,
            ocurrencias: None,
        }
    }

    pub fn with_occurrences(visible: &VisibleBlock, directory: &Directory, rrule: String) -> Self {
        BloqueoDto {
            ocurrencias: Some(visible.occurrences.iter().map(OcurrenciaDto::from).collect()),
            ..BloqueoDto::new(&visible.block, directory, rrule)
        }
    }
}

/// Body of `POST /bloqueos/validar-conflicto`: one interval, no recurrence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidarConflictoInput {
    pub tipo: TipoRecurso,
    pub recurso_id: String,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: DateTime<Utc>,
}

impl ValidarConflictoInput {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(self.tipo.into(), self.recurso_id.clone())
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.fecha_inicio, self.fecha_fin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidarConflictoDto {
    pub tiene_conflicto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citas_conflictivas: Option<Vec<String>>,
}
