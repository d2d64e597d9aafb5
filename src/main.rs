use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use log::info;

use training_scheduler::{
    FailurePolicy, Invocation, Phase, RunOptions, Schedule, Scheduler, SchedulerConfig,
};

/// Runs one train-then-eval job pair per map slot, all slots in parallel.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON run configuration. Built-in defaults are used when absent.
    #[arg(short, long, env = "SCHEDULER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of slots to run. Defaults to the number of maps.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Kill a phase that runs longer than this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not run eval for a slot whose train phase failed.
    #[arg(long)]
    skip_eval_on_failure: bool,

    /// Finish every train phase before starting any eval phase.
    #[arg(long)]
    staged: bool,

    /// Discard the stdout of the launched processes.
    #[arg(short, long)]
    quiet: bool,

    /// Print the resolved commands and exit without running them.
    #[arg(long)]
    print_commands: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    let workers = args.workers.unwrap_or(config.layout.maps.len());

    let options = RunOptions {
        schedule: if args.staged {
            Schedule::Staged
        } else {
            Schedule::PerSlot
        },
        on_train_failure: if args.skip_eval_on_failure {
            FailurePolicy::SkipEval
        } else {
            FailurePolicy::Continue
        },
        timeout: args.timeout_secs.map(Duration::from_secs),
        quiet: args.quiet,
        cancel_on_interrupt: true,
    };

    let scheduler = Scheduler::new(config, options);

    if args.print_commands {
        for job in scheduler.resolve_all(workers)? {
            for phase in [Phase::Train, Phase::Eval] {
                let executable = &scheduler.config().executable;
                println!("{}", Invocation::new(executable, &job, phase));
            }
        }
        return Ok(());
    }

    let summary = scheduler.run_all(workers)?;
    info!(
        "{} non-zero exit(s), {} launch failure(s)",
        summary.nonzero_exits().len(),
        summary.launch_failures().len()
    );

    println!("{summary}");
    println!("Done");
    Ok(())
}
