use std::{
    fmt,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::{
    configs::{Executable, WorkerSlot},
    error::LaunchError,
    resolver::{JobSpec, Phase},
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A fully built external process call for one phase of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub slot: WorkerSlot,
    pub phase: Phase,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Builds the call of `phase` for `job`: the executable's fixed arguments
    /// followed by the resolved ones.
    pub fn new(executable: &Executable, job: &JobSpec, phase: Phase) -> Self {
        let args = executable
            .args
            .iter()
            .chain(job.args(phase))
            .cloned()
            .collect();

        Self {
            slot: job.slot,
            phase,
            program: executable.program.clone(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own. `code` is `None` when it was killed by
    /// a signal.
    Exited { code: Option<i32> },
    /// The phase deadline expired and the process was killed.
    TimedOut,
    /// The run was cancelled and the process was killed.
    Cancelled,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited { code: Some(0) })
    }
}

/// Starts an external process and blocks until it ends.
pub trait Launcher: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// # Args
    /// * `invocation` - The program and arguments to run.
    /// * `cancel` - Checked while waiting; once cancelled the child is killed.
    ///
    /// # Returns
    /// How the process ended, whatever its status.
    ///
    /// # Errors
    /// Returns a `LaunchError` if the process could not be started.
    fn launch(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessExit, LaunchError>;
}

/// Spawns real processes with `std::process::Command`, no shell involved.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    timeout: Option<Duration>,
    quiet: bool,
}

impl SystemLauncher {
    /// Creates a new `SystemLauncher`.
    ///
    /// # Args
    /// * `timeout` - Optional deadline for a single phase.
    /// * `quiet` - Discard the child's stdout instead of inheriting it.
    pub fn new(timeout: Option<Duration>, quiet: bool) -> Self {
        Self { timeout, quiet }
    }

    fn wait(
        &self,
        child: &mut Child,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessExit, LaunchError> {
        let started = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(ProcessExit::Exited { code: status.code() }),
                Ok(None) => {}
                Err(source) => {
                    return Err(LaunchError::Io {
                        program: invocation.program.clone(),
                        source,
                    });
                }
            }

            if cancel.is_cancelled() {
                stop(child, invocation);
                return Ok(ProcessExit::Cancelled);
            }

            if self.timeout.is_some_and(|limit| started.elapsed() >= limit) {
                stop(child, invocation);
                return Ok(ProcessExit::TimedOut);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Launcher for SystemLauncher {
    fn launch(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessExit, LaunchError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdin(Stdio::null());
        if self.quiet {
            command.stdout(Stdio::null());
        }

        let mut child = command
            .spawn()
            .map_err(|e| LaunchError::from_spawn(&invocation.program, e))?;

        self.wait(&mut child, invocation, cancel)
    }
}

fn stop(child: &mut Child, invocation: &Invocation) {
    if let Err(e) = child.kill() {
        warn!(slot = invocation.slot.index(), phase = invocation.phase.as_str(); "kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        warn!(slot = invocation.slot.index(), phase = invocation.phase.as_str(); "reap failed: {e}");
    }
}
