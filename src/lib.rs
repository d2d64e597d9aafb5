pub mod configs;
pub mod error;
pub mod orchestra;
pub mod process;
pub mod resolver;

pub use configs::{Executable, PathLayout, RunConfig, SchedulerConfig, WorkerSlot};
pub use error::{ConfigError, LaunchError, SchedulerError};
pub use orchestra::{
    FailurePolicy, PhaseOutcome, RunOptions, RunSummary, Schedule, Scheduler, SlotOutcome,
};
pub use process::{Invocation, Launcher, ProcessExit, SystemLauncher};
pub use resolver::{resolve, JobSpec, Phase};

/// Runs train then eval for every slot in `[0, workers)` with real processes
/// and waits for all of them.
///
/// # Errors
/// Returns a `SchedulerError` if the run cannot be started.
pub fn run_all(
    workers: usize,
    config: SchedulerConfig,
    options: RunOptions,
) -> Result<RunSummary, SchedulerError> {
    log::info!("starting scheduler");
    Scheduler::new(config, options).run_all(workers)
}
