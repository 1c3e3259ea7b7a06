//! Fitness-center API gateway and administrator auth service.
//!
//! Two binaries share this library:
//! - `gateway`: reverse proxy fanning `/api/v1/*` out to the domain services
//! - `auth-service`: administrator credentials, bearer tokens and sessions

pub mod auth;
pub mod auth_service;
pub mod gateway;
pub mod health;
pub mod middleware;
pub mod shutdown;
pub mod telemetry;

pub use fitcenter_config as config;
pub use fitcenter_db as db;
pub use fitcenter_error as error;
