//! Run orchestration for shelfwright.
//!
//! Sequences backup → scan → deduplicate → categorize → execute as a state
//! machine, reports progress through a watch channel, and guarantees the
//! fail-closed ordering: nothing mutating runs unless the snapshot step
//! completed.

mod run;
mod state;

pub use run::{Engine, RunHandle, RunStatus};
pub use state::RunState;

// Re-export the report the caller receives
pub use shelfwright_core::{ExecutionReport, FatalError};
