//! # registrar-core
//!
//! In-memory coordination kernel for contended academic resources.
//! Provides a resource-keyed lock manager with READ/WRITE/EXCLUSIVE modes,
//! enrollment with FIFO waitlists, conflict-free room scheduling,
//! best-effort two-phase commit and Bully leader election.

pub mod client;
pub mod config;
pub mod conflict;
pub mod constraint;
pub mod coordinator;
pub mod election;
pub mod enrollment;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod lock_manager;
pub mod policy;
pub mod scheduler;
pub mod types;

pub use client::Registrar;
pub use error::{RegistrarError, Result};

#[cfg(test)]
mod client_test;
#[cfg(test)]
mod conflict_test;
#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
#[cfg(test)]
mod lock_manager_test;
#[cfg(test)]
mod scheduler_test;
