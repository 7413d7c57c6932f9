//! HTTP API for resource blocks.
//!
//! Exposes the building blocks (config, state, error handling, wire DTOs,
//! routes) so integration tests and the `bloqueos-server` binary share the
//! exact same router.

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod seed;
pub mod state;
