use std::sync::Arc;

use block_engine::{
    AppointmentSource, BlockStore, MemoryAppointments, MemoryBlockStore, SchedulingService,
};

use crate::config::ServerConfig;
use crate::seed::{Directory, Seed, SeedError};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the service and everything else sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub service: SchedulingService,
    /// Site and resource display names.
    pub directory: Arc<Directory>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        directory: Directory,
        store: Arc<dyn BlockStore>,
        appointments: Arc<dyn AppointmentSource>,
    ) -> Self {
        let service = SchedulingService::new(store, appointments, config.engine_config());
        Self {
            service,
            directory: Arc::new(directory),
            config: Arc::new(config),
        }
    }

    /// In-memory stores loaded from `seed`. Zones set in the configuration
    /// take precedence over zones declared in the seed.
    pub fn in_memory(mut config: ServerConfig, seed: &Seed) -> Result<Self, SeedError> {
        for (site, tz) in seed.site_timezones() {
            config.site_timezones.entry(site).or_insert(tz);
        }
        let appointments: MemoryAppointments = seed.appointments()?.into_iter().collect();

        Ok(Self::new(
            config,
            seed.directory(),
            Arc::new(MemoryBlockStore::new()),
            Arc::new(appointments),
        ))
    }
}
