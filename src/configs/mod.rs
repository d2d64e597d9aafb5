mod run;
mod slot;

pub use run::{Executable, PathLayout, RunConfig, SchedulerConfig};
pub use slot::WorkerSlot;
