use std::{fmt, time::Duration};

use crate::{
    configs::WorkerSlot,
    error::{ConfigError, LaunchError},
    process::ProcessExit,
    resolver::Phase,
};

/// Why a phase was never launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The train phase did not succeed and the policy skips eval.
    TrainFailed,
    /// The run was cancelled before the phase started.
    Cancelled,
}

/// What happened to one phase of one slot.
#[derive(Debug)]
pub enum PhaseOutcome {
    Exited { code: Option<i32> },
    TimedOut,
    Cancelled,
    LaunchFailed(LaunchError),
    Skipped(SkipReason),
}

impl PhaseOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, PhaseOutcome::Exited { code: Some(0) })
    }

    /// The process ran and reported a failure status.
    pub fn is_nonzero_exit(&self) -> bool {
        matches!(self, PhaseOutcome::Exited { code } if *code != Some(0))
    }

    pub fn launched(&self) -> bool {
        !matches!(
            self,
            PhaseOutcome::LaunchFailed(_) | PhaseOutcome::Skipped(_)
        )
    }
}

impl From<Result<ProcessExit, LaunchError>> for PhaseOutcome {
    fn from(value: Result<ProcessExit, LaunchError>) -> Self {
        match value {
            Ok(ProcessExit::Exited { code }) => Self::Exited { code },
            Ok(ProcessExit::TimedOut) => Self::TimedOut,
            Ok(ProcessExit::Cancelled) => Self::Cancelled,
            Err(e) => Self::LaunchFailed(e),
        }
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseOutcome::Exited { code: Some(0) } => write!(f, "ok"),
            PhaseOutcome::Exited { code: Some(code) } => write!(f, "exit {code}"),
            PhaseOutcome::Exited { code: None } => write!(f, "killed by signal"),
            PhaseOutcome::TimedOut => write!(f, "timed out"),
            PhaseOutcome::Cancelled => write!(f, "cancelled"),
            PhaseOutcome::LaunchFailed(e) => write!(f, "launch failed ({e})"),
            PhaseOutcome::Skipped(SkipReason::TrainFailed) => write!(f, "skipped (train failed)"),
            PhaseOutcome::Skipped(SkipReason::Cancelled) => write!(f, "skipped (cancelled)"),
        }
    }
}

/// Both phases of a slot that was dispatched.
#[derive(Debug)]
pub struct SlotPhases {
    pub train: PhaseOutcome,
    pub eval: PhaseOutcome,
}

impl SlotPhases {
    pub fn get(&self, phase: Phase) -> &PhaseOutcome {
        match phase {
            Phase::Train => &self.train,
            Phase::Eval => &self.eval,
        }
    }
}

#[derive(Debug)]
pub enum SlotOutcome {
    /// The worker ran and returned both phase outcomes.
    Finished(SlotPhases),
    /// The slot's arguments could not be resolved; nothing was launched.
    Unresolved(ConfigError),
    /// The worker went away before replying.
    Lost(String),
}

#[derive(Debug)]
pub struct SlotReport {
    pub slot: WorkerSlot,
    pub outcome: SlotOutcome,
}

impl SlotReport {
    pub fn phases(&self) -> Option<&SlotPhases> {
        match &self.outcome {
            SlotOutcome::Finished(phases) => Some(phases),
            _ => None,
        }
    }
}

impl fmt::Display for SlotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SlotOutcome::Finished(phases) => write!(
                f,
                "slot {}: train {}, eval {}",
                self.slot, phases.train, phases.eval
            ),
            SlotOutcome::Unresolved(e) => write!(f, "slot {}: not scheduled ({e})", self.slot),
            SlotOutcome::Lost(e) => write!(f, "slot {}: worker lost ({e})", self.slot),
        }
    }
}

/// The aggregate of one `run_all` call, one report per slot in slot order.
#[derive(Debug)]
pub struct RunSummary {
    pub slots: Vec<SlotReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn slot(&self, slot: usize) -> Option<&SlotReport> {
        self.slots.iter().find(|r| r.slot.index() == slot)
    }

    pub fn all_succeeded(&self) -> bool {
        self.slots.iter().all(|r| {
            r.phases()
                .is_some_and(|p| p.train.succeeded() && p.eval.succeeded())
        })
    }

    /// Every phase that ran and exited with a failure status.
    pub fn nonzero_exits(&self) -> Vec<(WorkerSlot, Phase, Option<i32>)> {
        self.phase_iter()
            .filter_map(|(slot, phase, outcome)| match outcome {
                PhaseOutcome::Exited { code } if outcome.is_nonzero_exit() => {
                    Some((slot, phase, *code))
                }
                _ => None,
            })
            .collect()
    }

    /// Every phase whose process could not be started.
    pub fn launch_failures(&self) -> Vec<(WorkerSlot, Phase, &LaunchError)> {
        self.phase_iter()
            .filter_map(|(slot, phase, outcome)| match outcome {
                PhaseOutcome::LaunchFailed(e) => Some((slot, phase, e)),
                _ => None,
            })
            .collect()
    }

    fn phase_iter(&self) -> impl Iterator<Item = (WorkerSlot, Phase, &PhaseOutcome)> {
        self.slots.iter().flat_map(|report| {
            report.phases().into_iter().flat_map(move |phases| {
                [Phase::Train, Phase::Eval]
                    .into_iter()
                    .map(move |phase| (report.slot, phase, phases.get(phase)))
            })
        })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.slots {
            writeln!(f, "{report}")?;
        }
        write!(
            f,
            "{} slot(s) finished in {:.1}s",
            self.slots.len(),
            self.elapsed.as_secs_f64()
        )
    }
}
