//! # Fitcenter Database
//!
//! Administrator and session persistence for the auth service.
//!
//! [`AuthStorage`] is the seam between the auth core and its tables; it is
//! implemented for Postgres ([`PostgresAuthStorage`]) and for process-local
//! tables ([`InMemoryAuthStorage`]).

mod memory;
mod models;
mod pagination;
mod pool;
mod postgres;
mod storage;

pub use memory::InMemoryAuthStorage;
pub use models::{AdminProfile, Administrator, NewAdministrator, NewSession, Session};
pub use pagination::{Page, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{connect_options, create_pool, DbPool};
pub use postgres::PostgresAuthStorage;
pub use storage::{cap_reached_message, AuthStorage, StoreError, StoreResult};
