use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Barrier},
};

use actix::prelude::*;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::{
    summary::{PhaseOutcome, SkipReason, SlotPhases},
    FailurePolicy,
};
use crate::{
    configs::Executable,
    error::LaunchError,
    process::{Invocation, Launcher},
    resolver::{JobSpec, Phase},
};

/// Lifecycle of a single slot. Train always precedes eval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    TrainRunning,
    EvalRunning,
    Done,
}

impl SlotState {
    /// The only state this one may move to, `None` once done.
    pub fn next(self) -> Option<Self> {
        match self {
            SlotState::Pending => Some(SlotState::TrainRunning),
            SlotState::TrainRunning => Some(SlotState::EvalRunning),
            SlotState::EvalRunning => Some(SlotState::Done),
            SlotState::Done => None,
        }
    }
}

struct Progress {
    slot: usize,
    state: SlotState,
}

impl Progress {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            state: SlotState::Pending,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(slot = self.slot; "{:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// orchestrator -> worker: run both phases of a resolved slot.
#[derive(Message)]
#[rtype(result = "SlotPhases")]
pub(crate) struct RunSlot {
    pub job: JobSpec,
    /// Present in staged runs; every slot waits here between train and eval.
    pub barrier: Option<Arc<Barrier>>,
}

/// One pool thread. Blocks on each external process in turn.
pub(crate) struct SlotWorker {
    launcher: Arc<dyn Launcher>,
    executable: Arc<Executable>,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

impl Actor for SlotWorker {
    type Context = SyncContext<Self>;
}

impl Handler<RunSlot> for SlotWorker {
    type Result = MessageResult<RunSlot>;

    fn handle(&mut self, msg: RunSlot, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.run_slot(&msg.job, msg.barrier.as_deref()))
    }
}

impl SlotWorker {
    pub(crate) fn new(
        launcher: Arc<dyn Launcher>,
        executable: Arc<Executable>,
        policy: FailurePolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            executable,
            policy,
            cancel,
        }
    }

    fn run_slot(&self, job: &JobSpec, barrier: Option<&Barrier>) -> SlotPhases {
        let mut progress = Progress::new(job.slot.index());

        progress.advance();
        let train = self.run_phase(job, Phase::Train);

        if let Some(barrier) = barrier {
            debug!(slot = progress.slot; "waiting for every train phase");
            barrier.wait();
        }

        progress.advance();
        let eval = match self.skip_eval(&train) {
            Some(reason) => {
                info!(slot = progress.slot; "eval skipped: {reason:?}");
                PhaseOutcome::Skipped(reason)
            }
            None => self.run_phase(job, Phase::Eval),
        };

        progress.advance();
        SlotPhases { train, eval }
    }

    fn skip_eval(&self, train: &PhaseOutcome) -> Option<SkipReason> {
        if self.cancel.is_cancelled() {
            return Some(SkipReason::Cancelled);
        }

        match self.policy {
            FailurePolicy::SkipEval if !train.succeeded() => Some(SkipReason::TrainFailed),
            _ => None,
        }
    }

    fn run_phase(&self, job: &JobSpec, phase: Phase) -> PhaseOutcome {
        let slot = job.slot.index();
        if self.cancel.is_cancelled() {
            return PhaseOutcome::Skipped(SkipReason::Cancelled);
        }

        let invocation = Invocation::new(&self.executable, job, phase);
        info!(slot = slot, phase = phase.as_str(); "launching: {invocation}");

        // A panicking launcher must still let this slot reach the staged barrier.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.launcher.launch(&invocation, &self.cancel)
        }))
        .unwrap_or_else(|_| {
            Err(LaunchError::Panicked {
                program: invocation.program.clone(),
            })
        });

        let outcome = PhaseOutcome::from(result);
        match &outcome {
            PhaseOutcome::Exited { code: Some(0) } => {
                info!(slot = slot, phase = phase.as_str(); "exited successfully");
            }
            PhaseOutcome::LaunchFailed(e) => {
                warn!(slot = slot, phase = phase.as_str(); "launch failed: {e}");
            }
            other => warn!(slot = slot, phase = phase.as_str(); "finished: {other}"),
        }

        outcome
    }
}
