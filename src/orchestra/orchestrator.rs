use std::{
    sync::{Arc, Barrier},
    time::{Duration, Instant},
};

use actix::{prelude::*, System};
use futures::future::join_all;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::{
    summary::{RunSummary, SlotOutcome, SlotReport},
    worker::{RunSlot, SlotWorker},
};
use crate::{
    configs::{SchedulerConfig, WorkerSlot},
    error::{ConfigError, SchedulerError},
    process::{Launcher, SystemLauncher},
    resolver::{self, JobSpec},
};

/* -------------------------------------------------------------------------- */
/*                                  Options                                   */
/* -------------------------------------------------------------------------- */

/// What a slot does with its eval phase when train did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Run eval regardless of how train ended.
    #[default]
    Continue,
    /// Record eval as skipped.
    SkipEval,
}

/// How phases line up across slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Every slot runs train then eval on its own.
    #[default]
    PerSlot,
    /// All train phases finish before any eval phase starts.
    Staged,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub schedule: Schedule,
    pub on_train_failure: FailurePolicy,
    /// Deadline for a single phase. Only honored by the system launcher.
    pub timeout: Option<Duration>,
    /// Discard children's stdout. Only honored by the system launcher.
    pub quiet: bool,
    /// Cancel the run on Ctrl-C.
    pub cancel_on_interrupt: bool,
}

/* -------------------------------------------------------------------------- */
/*                                 Scheduler                                  */
/* -------------------------------------------------------------------------- */

/// Fans a run out to one pool thread per slot and joins them all.
pub struct Scheduler {
    config: Arc<SchedulerConfig>,
    launcher: Arc<dyn Launcher>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler that spawns real processes.
    ///
    /// # Args
    /// * `config` - The run configuration shared by every slot.
    /// * `options` - Scheduling and process options.
    ///
    /// # Returns
    /// A new `Scheduler` instance.
    pub fn new(config: SchedulerConfig, options: RunOptions) -> Self {
        let launcher = SystemLauncher::new(options.timeout, options.quiet);
        Self::with_launcher(config, options, Arc::new(launcher))
    }

    /// Creates a scheduler that runs every phase through `launcher`.
    pub fn with_launcher(
        config: SchedulerConfig,
        options: RunOptions,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            launcher,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// A handle that cancels the run from any thread. Running children are
    /// killed and phases not yet started are skipped; `run_all` still waits
    /// for every slot.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves every slot in `[0, workers)`.
    ///
    /// # Errors
    /// Returns the first slot's `ConfigError`.
    pub fn resolve_all(&self, workers: usize) -> Result<Vec<JobSpec>, SchedulerError> {
        self.check(workers)?;
        (0..workers)
            .map(|index| self.resolve(WorkerSlot::new(index), workers))
            .collect::<Result<_, _>>()
            .map_err(SchedulerError::from)
    }

    /// Runs train then eval for every slot in `[0, workers)`, all slots at
    /// once, and returns when every slot is done.
    ///
    /// A slot that fails to resolve or launch is recorded in the summary and
    /// does not affect the others.
    ///
    /// # Errors
    /// Returns a `SchedulerError` only if the pool cannot be built: a zero
    /// worker count or a configuration no slot could use. A slot with no map
    /// of its own is reported as `SlotOutcome::Unresolved` instead.
    pub fn run_all(&self, workers: usize) -> Result<RunSummary, SchedulerError> {
        self.check(workers)?;

        let started = Instant::now();
        info!("scheduling {workers} slot(s)");

        let mut reports = Vec::with_capacity(workers);
        let mut jobs = Vec::with_capacity(workers);
        for index in 0..workers {
            let slot = WorkerSlot::new(index);
            match self.resolve(slot, workers) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(slot = index; "not scheduled: {e}");
                    reports.push(SlotReport {
                        slot,
                        outcome: SlotOutcome::Unresolved(e),
                    });
                }
            }
        }

        reports.extend(System::new().block_on(self.dispatch(jobs)));
        reports.sort_by_key(|r| r.slot);

        let summary = RunSummary {
            slots: reports,
            elapsed: started.elapsed(),
        };
        info!("all {workers} slot(s) done in {:?}", summary.elapsed);
        Ok(summary)
    }

    fn check(&self, workers: usize) -> Result<(), SchedulerError> {
        if workers == 0 {
            return Err(SchedulerError::InvalidWorkerCount(workers));
        }
        self.config.validate()?;
        Ok(())
    }

    fn resolve(&self, slot: WorkerSlot, workers: usize) -> Result<JobSpec, ConfigError> {
        resolver::resolve(slot, workers, &self.config.run, &self.config.layout)
    }

    /// Starts one sync actor thread per job, sends each its job and waits for
    /// every reply.
    async fn dispatch(&self, jobs: Vec<JobSpec>) -> Vec<SlotReport> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let threads = jobs.len();
        let barrier = match self.options.schedule {
            Schedule::Staged => Some(Arc::new(Barrier::new(threads))),
            Schedule::PerSlot => None,
        };

        let launcher = Arc::clone(&self.launcher);
        let executable = Arc::new(self.config.executable.clone());
        let policy = self.options.on_train_failure;
        let cancel = self.cancel.clone();
        let pool = SyncArbiter::start(threads, move || {
            SlotWorker::new(
                Arc::clone(&launcher),
                Arc::clone(&executable),
                policy,
                cancel.clone(),
            )
        });

        let interrupt = self.options.cancel_on_interrupt.then(|| {
            let cancel = self.cancel.clone();
            actix_rt::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling running jobs");
                    cancel.cancel();
                }
            })
        });

        let requests = jobs.into_iter().map(|job| {
            let slot = job.slot;
            let request = pool.send(RunSlot {
                job,
                barrier: barrier.clone(),
            });

            async move {
                let outcome = match request.await {
                    Ok(phases) => SlotOutcome::Finished(phases),
                    Err(e) => {
                        warn!(slot = slot.index(); "worker lost: {e}");
                        SlotOutcome::Lost(e.to_string())
                    }
                };
                SlotReport { slot, outcome }
            }
        });

        let reports = join_all(requests).await;
        if let Some(handle) = interrupt {
            handle.abort();
        }

        reports
    }
}
