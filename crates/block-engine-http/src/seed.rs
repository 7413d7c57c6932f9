//! Startup data for the in-memory server: sites, resources, appointments.
//!
//! ```json
//! {
//!   "sedes":    [{ "id": "sede-centro", "nombre": "Sede Centro", "zonaHoraria": "America/Santiago" }],
//!   "recursos": [{ "tipo": "SALA", "id": "sala-1", "nombre": "Box 1" }],
//!   "citas":    [{ "id": "cita-1", "tipo": "PROFESIONAL", "recursoId": "prof-1",
//!                  "fechaInicio": "2025-03-03T13:00:00Z", "fechaFin": "2025-03-03T13:30:00Z",
//!                  "estado": "CONFIRMADA" }]
//! }
//! ```
//!
//! Sites and resources only feed the display names in block responses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use block_engine::{Appointment, AppointmentStatus, ResourceRef, TimeWindow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::dto::TipoRecurso;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid seed data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Appointment {0} ends before it starts")]
    InvalidAppointment(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub sedes: Vec<SedeSeed>,
    #[serde(default)]
    pub recursos: Vec<RecursoSeed>,
    #[serde(default)]
    pub citas: Vec<CitaSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SedeSeed {
    pub id: String,
    pub nombre: String,
    #[serde(default)]
    pub zona_horaria: Option<Tz>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursoSeed {
    pub tipo: TipoRecurso,
    pub id: String,
    pub nombre: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitaSeed {
    pub id: String,
    pub tipo: TipoRecurso,
    pub recurso_id: String,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: DateTime<Utc>,
    #[serde(default = "default_estado")]
    pub estado: EstadoCita,
}

fn default_estado() -> EstadoCita {
    EstadoCita::Programada
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoCita {
    #[serde(alias = "SCHEDULED")]
    Programada,
    #[serde(alias = "CONFIRMED")]
    Confirmada,
    #[serde(alias = "IN_PROGRESS")]
    EnCurso,
    #[serde(alias = "COMPLETED")]
    Completada,
    #[serde(alias = "NO_SHOW")]
    NoAsistio,
    #[serde(alias = "CANCELLED")]
    Cancelada,
    #[serde(alias = "VOID")]
    Anulada,
}

impl From<EstadoCita> for AppointmentStatus {
    fn from(estado: EstadoCita) -> Self {
        match estado {
            EstadoCita::Programada => AppointmentStatus::Scheduled,
            EstadoCita::Confirmada => AppointmentStatus::Confirmed,
            EstadoCita::EnCurso => AppointmentStatus::InProgress,
            EstadoCita::Completada => AppointmentStatus::Completed,
            EstadoCita::NoAsistio => AppointmentStatus::NoShow,
            EstadoCita::Cancelada => AppointmentStatus::Cancelled,
            EstadoCita::Anulada => AppointmentStatus::Void,
        }
    }
}

impl Seed {
    pub fn from_path(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn directory(&self) -> Directory {
        Directory {
            sites: self
                .sedes
                .iter()
                .map(|s| (s.id.clone(), s.nombre.clone()))
                .collect(),
            resources: self
                .recursos
                .iter()
                .map(|r| (ResourceRef::new(r.tipo.into(), r.id.clone()), r.nombre.clone()))
                .collect(),
        }
    }

    /// Zones declared per site in the seed.
    pub fn site_timezones(&self) -> HashMap<String, Tz> {
        self.sedes
            .iter()
            .filter_map(|s| s.zona_horaria.map(|tz| (s.id.clone(), tz)))
            .collect()
    }

    pub fn appointments(&self) -> Result<Vec<Appointment>, SeedError> {
        self.citas
            .iter()
            .map(|cita| {
                let window = TimeWindow::new(cita.fecha_inicio, cita.fecha_fin);
                if !window.is_valid() {
                    return Err(SeedError::InvalidAppointment(cita.id.clone()));
                }
                Ok(Appointment {
                    id: cita.id.clone(),
                    resource_type: cita.tipo.into(),
                    resource_id: cita.recurso_id.clone(),
                    window,
                    status: cita.estado.into(),
                })
            })
            .collect()
    }
}

/// Display names for sites and resources.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    sites: HashMap<String, String>,
    resources: HashMap<ResourceRef, String>,
}

impl Directory {
    pub fn site_name(&self, site_id: &str) -> Option<&str> {
        self.sites.get(site_id).map(String::as_str)
    }

    pub fn resource_name(&self, resource: &ResourceRef) -> Option<&str> {
        self.resources.get(resource).map(String::as_str)
    }
}
