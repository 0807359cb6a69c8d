//! The monitoring loop.
//!
//! Each iteration polls every tracked session in registry order through one
//! [`DetectionStrategy`](crate::detect::DetectionStrategy), folds the results
//! into the registry, and decides whether to keep going:
//!
//! ```text
//!   detect all ──► partition ──► confirm ──► act ──► persist ──► sleep
//!                  (dead / hit / miss)       (auto-type, notify, stop)
//! ```
//!
//! Loop-local state ([`ConfirmationTracker`], [`InterventionController`]) is
//! owned by [`LoopState`] and never persisted. Termination is returned as a
//! [`TerminationReason`]; interruption and internal faults surface as
//! [`MonitorError`](crate::error::MonitorError) after the registry is flushed.

pub mod confirm;
pub mod engine;
pub mod intervention;

pub use confirm::{Confirmation, ConfirmationTracker, PendingPolicy};
pub use engine::{
    LoopConfig, LoopOutcome, LoopState, MonitorLoop, Sleeper, TerminationReason, ThreadSleeper,
    SLEEP_SLICE_MS,
};
pub use intervention::{InterventionController, DEFAULT_MAX_INTERVENTIONS};
