#![forbid(unsafe_code)]

//! Live job-status synchronization client for the bulk CSV product importer.
//!
//! Follows a background import job over a Server-Sent Events push channel,
//! falls back to polling when the push side stalls or faults, and tears
//! everything down once the job reaches a terminal status.

pub mod channel;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;

pub use config::SyncConfig;
pub use errors::{AppError, Result};
pub use models::session::{SessionPhase, SessionView};
pub use models::status::{JobStatus, StatusSnapshot, StatusUpdate};
pub use orchestrator::manager::SyncManager;
pub use orchestrator::session::{SyncHandle, SyncSession};
