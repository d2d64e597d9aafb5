pub mod orchestrator;
pub mod summary;
mod worker;

pub use orchestrator::{FailurePolicy, RunOptions, Schedule, Scheduler};
pub use summary::{PhaseOutcome, RunSummary, SkipReason, SlotOutcome, SlotPhases, SlotReport};
pub use worker::SlotState;
