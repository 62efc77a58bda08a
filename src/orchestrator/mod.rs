//! Sync orchestration modules.
//!
//! Covers the per-job session state machine, snapshot reconciliation,
//! stall detection, and the session registry.

pub mod manager;
pub mod reconciler;
pub mod session;
pub mod stall_detector;
