use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use training_scheduler::{
    error::SlotBound,
    orchestra::{SkipReason, SlotOutcome},
    ConfigError, FailurePolicy, Invocation, LaunchError, Launcher, Phase, PhaseOutcome, ProcessExit,
    RunOptions, Schedule, Scheduler, SchedulerConfig, SchedulerError,
};

#[derive(Debug, Clone)]
struct Call {
    slot: usize,
    phase: Phase,
    started: Instant,
    finished: Instant,
}

/// Records every invocation and answers with a scripted result.
#[derive(Default)]
struct FakeLauncher {
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    exit_codes: HashMap<(usize, Phase), i32>,
    unlaunchable: Vec<(usize, Phase)>,
    panics_on: Vec<(usize, Phase)>,
}

impl FakeLauncher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, slot: usize) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.slot == slot).collect()
    }
}

impl Launcher for FakeLauncher {
    fn launch(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<ProcessExit, LaunchError> {
        let key = (invocation.slot.index(), invocation.phase);
        if self.unlaunchable.contains(&key) {
            return Err(LaunchError::NotFound {
                program: invocation.program.clone(),
            });
        }

        if self.panics_on.contains(&key) {
            panic!("launcher blew up on slot {}", key.0);
        }

        let started = Instant::now();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(Call {
            slot: key.0,
            phase: key.1,
            started,
            finished: Instant::now(),
        });

        let code = self.exit_codes.get(&key).copied().unwrap_or(0);
        Ok(ProcessExit::Exited { code: Some(code) })
    }
}

fn scheduler(launcher: &Arc<FakeLauncher>, options: RunOptions) -> Scheduler {
    Scheduler::with_launcher(SchedulerConfig::default(), options, launcher.clone())
}

#[test]
fn four_workers_make_exactly_eight_invocations() {
    let launcher = Arc::new(FakeLauncher::with_delay(Duration::from_millis(20)));
    let summary = scheduler(&launcher, RunOptions::default())
        .run_all(4)
        .unwrap();

    let calls = launcher.calls();
    assert_eq!(calls.len(), 8);
    for slot in 0..4 {
        let phases: Vec<_> = launcher.calls_for(slot).iter().map(|c| c.phase).collect();
        assert_eq!(phases, [Phase::Train, Phase::Eval]);
    }

    assert_eq!(summary.slots.len(), 4);
    assert!(summary.all_succeeded());
}

#[test]
fn train_always_finishes_before_eval_of_the_same_slot() {
    let launcher = Arc::new(FakeLauncher::with_delay(Duration::from_millis(10)));
    scheduler(&launcher, RunOptions::default())
        .run_all(4)
        .unwrap();

    for slot in 0..4 {
        let calls = launcher.calls_for(slot);
        let train = calls.iter().find(|c| c.phase == Phase::Train).unwrap();
        let eval = calls.iter().find(|c| c.phase == Phase::Eval).unwrap();
        assert!(train.finished <= eval.started, "slot {slot} ran eval early");
    }
}

#[test]
fn all_slots_run_concurrently() {
    let launcher = Arc::new(FakeLauncher::with_delay(Duration::from_millis(200)));
    scheduler(&launcher, RunOptions::default())
        .run_all(4)
        .unwrap();

    assert_eq!(launcher.peak.load(Ordering::SeqCst), 4);
}

#[test]
fn nonzero_train_exit_still_runs_eval_once_and_is_recorded() {
    let launcher = Arc::new(FakeLauncher {
        exit_codes: HashMap::from([((1, Phase::Train), 3)]),
        ..FakeLauncher::default()
    });
    let summary = scheduler(&launcher, RunOptions::default())
        .run_all(2)
        .unwrap();

    let evals = launcher
        .calls_for(1)
        .into_iter()
        .filter(|c| c.phase == Phase::Eval)
        .count();
    assert_eq!(evals, 1);

    let phases = summary.slot(1).and_then(|r| r.phases()).unwrap();
    assert!(phases.train.is_nonzero_exit());
    assert!(phases.eval.succeeded());
    assert_eq!(
        summary
            .nonzero_exits()
            .into_iter()
            .map(|(slot, phase, code)| (slot.index(), phase, code))
            .collect::<Vec<_>>(),
        vec![(1, Phase::Train, Some(3))]
    );
}

#[test]
fn skip_eval_policy_leaves_other_slots_alone() {
    let launcher = Arc::new(FakeLauncher {
        exit_codes: HashMap::from([((0, Phase::Train), 1)]),
        ..FakeLauncher::default()
    });
    let options = RunOptions {
        on_train_failure: FailurePolicy::SkipEval,
        ..RunOptions::default()
    };
    let summary = scheduler(&launcher, options).run_all(3).unwrap();

    assert_eq!(launcher.calls_for(0).len(), 1);
    assert_eq!(launcher.calls().len(), 5);

    let phases = summary.slot(0).and_then(|r| r.phases()).unwrap();
    assert!(matches!(
        phases.eval,
        PhaseOutcome::Skipped(SkipReason::TrainFailed)
    ));
    for slot in 1..3 {
        let phases = summary.slot(slot).and_then(|r| r.phases()).unwrap();
        assert!(phases.train.succeeded() && phases.eval.succeeded());
    }
}

#[test]
fn launch_failure_is_isolated_to_its_slot() {
    let launcher = Arc::new(FakeLauncher {
        unlaunchable: vec![(2, Phase::Train)],
        ..FakeLauncher::default()
    });
    let summary = scheduler(&launcher, RunOptions::default())
        .run_all(4)
        .unwrap();

    let failures = summary.launch_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.index(), 2);
    assert_eq!(failures[0].1, Phase::Train);

    // Under the default policy the eval phase is still attempted.
    let phases = summary.slot(2).and_then(|r| r.phases()).unwrap();
    assert!(!phases.train.launched());
    assert!(phases.eval.succeeded());

    for slot in [0, 1, 3] {
        assert_eq!(launcher.calls_for(slot).len(), 2);
    }
}

#[test]
fn staged_schedule_finishes_every_train_before_any_eval() {
    let launcher = Arc::new(FakeLauncher {
        delay: Duration::from_millis(10),
        exit_codes: HashMap::new(),
        ..FakeLauncher::default()
    });
    let options = RunOptions {
        schedule: Schedule::Staged,
        ..RunOptions::default()
    };
    scheduler(&launcher, options).run_all(4).unwrap();

    let calls = launcher.calls();
    let last_train = calls
        .iter()
        .filter(|c| c.phase == Phase::Train)
        .map(|c| c.finished)
        .max()
        .unwrap();
    let first_eval = calls
        .iter()
        .filter(|c| c.phase == Phase::Eval)
        .map(|c| c.started)
        .min()
        .unwrap();

    assert_eq!(calls.len(), 8);
    assert!(last_train <= first_eval);
}

#[test]
fn cancelled_run_skips_every_phase_but_still_reports_each_slot() {
    let launcher = Arc::new(FakeLauncher::default());
    let scheduler = scheduler(&launcher, RunOptions::default());
    scheduler.cancellation_token().cancel();

    let summary = scheduler.run_all(2).unwrap();

    assert!(launcher.calls().is_empty());
    assert_eq!(summary.slots.len(), 2);
    for report in &summary.slots {
        let phases = report.phases().unwrap();
        assert!(matches!(
            phases.train,
            PhaseOutcome::Skipped(SkipReason::Cancelled)
        ));
        assert!(matches!(
            phases.eval,
            PhaseOutcome::Skipped(SkipReason::Cancelled)
        ));
    }
}

#[test]
fn zero_workers_is_rejected() {
    let launcher = Arc::new(FakeLauncher::default());
    let err = scheduler(&launcher, RunOptions::default())
        .run_all(0)
        .unwrap_err();

    assert!(matches!(err, SchedulerError::InvalidWorkerCount(0)));
    assert!(launcher.calls().is_empty());
}

#[test]
fn slot_without_a_map_is_unresolved_and_the_rest_still_run() {
    let launcher = Arc::new(FakeLauncher::default());
    let summary = scheduler(&launcher, RunOptions::default())
        .run_all(5)
        .unwrap();

    assert_eq!(launcher.calls().len(), 8);
    assert_eq!(summary.slots.len(), 5);
    for slot in 0..4 {
        assert!(matches!(
            summary.slot(slot).unwrap().outcome,
            SlotOutcome::Finished(_)
        ));
    }
    assert!(matches!(
        summary.slot(4).unwrap().outcome,
        SlotOutcome::Unresolved(ConfigError::SlotOutOfRange {
            slot: 4,
            bound: 4,
            kind: SlotBound::Maps
        })
    ));
    assert!(!summary.all_succeeded());
}

#[test]
fn shared_output_prefix_fails_the_run_up_front() {
    let launcher = Arc::new(FakeLauncher::default());
    let mut config = SchedulerConfig::default();
    config.layout.eval_prefix = config.layout.train_prefix.clone();

    let err = Scheduler::with_launcher(config, RunOptions::default(), launcher.clone())
        .run_all(4)
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::Config(ConfigError::SharedOutputPrefix(_))
    ));
    assert!(launcher.calls().is_empty());
}

#[test]
fn panicking_launcher_does_not_stall_a_staged_run() {
    let launcher = Arc::new(FakeLauncher {
        panics_on: vec![(1, Phase::Train)],
        ..FakeLauncher::default()
    });
    let options = RunOptions {
        schedule: Schedule::Staged,
        ..RunOptions::default()
    };
    let summary = scheduler(&launcher, options).run_all(4).unwrap();

    assert_eq!(summary.slots.len(), 4);
    let phases = summary.slot(1).and_then(|r| r.phases()).unwrap();
    assert!(matches!(
        phases.train,
        PhaseOutcome::LaunchFailed(LaunchError::Panicked { .. })
    ));
    assert!(phases.eval.succeeded());
    assert_eq!(launcher.calls().len(), 7);
}

#[test]
fn every_slot_reports_in_slot_order() {
    let launcher = Arc::new(FakeLauncher::default());
    let summary = scheduler(&launcher, RunOptions::default())
        .run_all(4)
        .unwrap();

    let slots: Vec<_> = summary.slots.iter().map(|r| r.slot.index()).collect();
    assert_eq!(slots, [0, 1, 2, 3]);
    assert!(summary
        .slots
        .iter()
        .all(|r| matches!(r.outcome, SlotOutcome::Finished(_))));
}
