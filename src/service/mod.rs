//! Service layer for the versus match service
//!
//! Application state wiring, health checks and background task management
//! for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats};
