use std::{error::Error, fmt, io, path::PathBuf};

/// Which bound a slot index was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBound {
    Workers,
    Maps,
}

impl fmt::Display for SlotBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotBound::Workers => write!(f, "worker count"),
            SlotBound::Maps => write!(f, "map sequence length"),
        }
    }
}

/// Invalid run configuration, detected before any process is launched.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// The configuration is not valid JSON, misses a required field or holds a
    /// value of the wrong type (e.g. a negative episode count).
    Parse(serde_json::Error),
    /// A slot index below zero.
    NegativeSlot(i64),
    /// A slot index outside `[0, bound)`.
    SlotOutOfRange {
        slot: usize,
        bound: usize,
        kind: SlotBound,
    },
    /// Train and eval would write to the same output files.
    SharedOutputPrefix(PathBuf),
    /// A layer-size list with no entries.
    EmptyLayers(&'static str),
    /// A layer of width zero.
    ZeroLayerSize { layers: &'static str, index: usize },
    /// A learning rate that is not a finite positive number.
    InvalidLearningRate { name: &'static str, value: f64 },
    /// The executable to invoke is empty.
    EmptyProgram,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read '{}': {source}", path.display())
            }
            ConfigError::Parse(e) => write!(f, "invalid config: {e}"),
            ConfigError::NegativeSlot(slot) => write!(f, "slot {slot} is negative"),
            ConfigError::SlotOutOfRange { slot, bound, kind } => {
                write!(f, "slot {slot} out of range for {kind} {bound}")
            }
            ConfigError::SharedOutputPrefix(prefix) => write!(
                f,
                "train and eval share the output prefix '{}'",
                prefix.display()
            ),
            ConfigError::EmptyLayers(name) => write!(f, "{name} must not be empty"),
            ConfigError::ZeroLayerSize { layers, index } => {
                write!(f, "{layers}[{index}] must be a positive layer size")
            }
            ConfigError::InvalidLearningRate { name, value } => {
                write!(f, "{name} must be a finite positive number, got {value}")
            }
            ConfigError::EmptyProgram => write!(f, "program must not be empty"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// The external process could not be started at all.
#[derive(Debug)]
pub enum LaunchError {
    NotFound { program: String },
    PermissionDenied { program: String },
    Io { program: String, source: io::Error },
    /// The launcher panicked before reporting an exit.
    Panicked { program: String },
}

impl LaunchError {
    /// Classifies a spawn failure.
    ///
    /// # Args
    /// * `program` - The executable that failed to start.
    /// * `source` - The error returned by the spawn call.
    ///
    /// # Returns
    /// The matching `LaunchError` variant.
    pub fn from_spawn(program: &str, source: io::Error) -> Self {
        let program = program.to_string();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { program },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io { program, source },
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::NotFound { program } => write!(f, "executable '{program}' not found"),
            LaunchError::PermissionDenied { program } => {
                write!(f, "permission denied launching '{program}'")
            }
            LaunchError::Io { program, source } => {
                write!(f, "failed to launch '{program}': {source}")
            }
            LaunchError::Panicked { program } => {
                write!(f, "launcher panicked running '{program}'")
            }
        }
    }
}

impl Error for LaunchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LaunchError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures that prevent a run from starting at all.
#[derive(Debug)]
pub enum SchedulerError {
    /// The pool needs at least one worker.
    InvalidWorkerCount(usize),
    /// The configuration is unusable for every slot.
    Config(ConfigError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidWorkerCount(n) => {
                write!(f, "worker count must be positive, got {n}")
            }
            SchedulerError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SchedulerError::Config(e) => Some(e),
            SchedulerError::InvalidWorkerCount(_) => None,
        }
    }
}

impl From<ConfigError> for SchedulerError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
