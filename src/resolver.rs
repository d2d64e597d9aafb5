//! Turns a slot index into the argument lists of its two phases.
//!
//! Train arguments, in order:
//! `-i <slot> train -e <episodes> -m <max_episodes> -b <batch> [-t <iterations>]
//! -s <map> -p <model> -a <actor..> -c <critic..> --lra <lr> --lrc <lr>
//! --cst <stored> --cdt <destroyed> --tpp <plot> --tlp <log> --tsp <state>`
//!
//! Eval arguments, in order:
//! `-i <slot> eval -m <max_episodes> -s <map> -p <model> --cst <stored>
//! --cdt <destroyed> --epp <plot> --elp <log> --esp <state>`

use std::{fmt, path::Path};

use crate::{
    configs::{PathLayout, RunConfig, WorkerSlot},
    error::{ConfigError, SlotBound},
};

/// One of the two sequential sub-jobs of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Eval,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Eval => "eval",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files the external process writes for one phase of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub plot: String,
    pub log: String,
    pub state: String,
}

impl OutputPaths {
    fn new(prefix: &Path, slot: usize) -> Self {
        let prefix = prefix.display();
        Self {
            plot: format!("{prefix}_plot_{slot}.png"),
            log: format!("{prefix}_log_{slot}.log"),
            state: format!("{prefix}_state_{slot}.log"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [self.plot.as_str(), self.log.as_str(), self.state.as_str()].into_iter()
    }
}

/// The resolved work of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub slot: WorkerSlot,
    pub map: String,
    pub model: String,
    pub train_outputs: OutputPaths,
    pub eval_outputs: OutputPaths,
    pub train: Vec<String>,
    pub eval: Vec<String>,
}

impl JobSpec {
    pub fn args(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Train => &self.train,
            Phase::Eval => &self.eval,
        }
    }

    pub fn outputs(&self, phase: Phase) -> &OutputPaths {
        match phase {
            Phase::Train => &self.train_outputs,
            Phase::Eval => &self.eval_outputs,
        }
    }
}

/// Resolves the train and eval argument lists of a slot.
///
/// Pure and deterministic: the same inputs always give the same `JobSpec`.
///
/// # Args
/// * `slot` - The slot to resolve.
/// * `workers` - Number of slots in the run.
/// * `run` - Hyperparameters shared by every slot.
/// * `layout` - The map sequence and the path prefixes.
///
/// # Errors
/// Returns a `ConfigError` if the slot is outside either `[0, workers)` or the
/// map sequence, if any parameter is invalid, or if train and eval would share
/// output files.
pub fn resolve(
    slot: WorkerSlot,
    workers: usize,
    run: &RunConfig,
    layout: &PathLayout,
) -> Result<JobSpec, ConfigError> {
    let index = slot.index();
    check_bound(index, workers, SlotBound::Workers)?;
    check_bound(index, layout.maps.len(), SlotBound::Maps)?;
    run.validate()?;
    layout.validate()?;

    let map = layout.map_dir.join(&layout.maps[index]).display().to_string();
    let model = format!("{}_{index}.pt", layout.model_prefix.display());
    let train_outputs = OutputPaths::new(&layout.train_prefix, index);
    let eval_outputs = OutputPaths::new(&layout.eval_prefix, index);

    let mut train = vec![
        "-i".to_string(),
        index.to_string(),
        Phase::Train.as_str().to_string(),
        "-e".to_string(),
        run.episodes.to_string(),
        "-m".to_string(),
        run.max_episodes.to_string(),
        "-b".to_string(),
        run.batch_size.to_string(),
    ];
    if let Some(iterations) = run.train_iterations {
        train.extend(["-t".to_string(), iterations.to_string()]);
    }
    train.extend(["-s".to_string(), map.clone(), "-p".to_string(), model.clone()]);
    train.push("-a".to_string());
    train.extend(run.actor_layers.iter().map(ToString::to_string));
    train.push("-c".to_string());
    train.extend(run.critic_layers.iter().map(ToString::to_string));
    train.extend([
        "--lra".to_string(),
        run.lr_actor.to_string(),
        "--lrc".to_string(),
        run.lr_critic.to_string(),
    ]);
    push_targets(&mut train, run);
    push_outputs(&mut train, Phase::Train, &train_outputs);

    let mut eval = vec![
        "-i".to_string(),
        index.to_string(),
        Phase::Eval.as_str().to_string(),
        "-m".to_string(),
        run.max_episodes.to_string(),
        "-s".to_string(),
        map.clone(),
        "-p".to_string(),
        model.clone(),
    ];
    push_targets(&mut eval, run);
    push_outputs(&mut eval, Phase::Eval, &eval_outputs);

    Ok(JobSpec {
        slot,
        map,
        model,
        train_outputs,
        eval_outputs,
        train,
        eval,
    })
}

fn check_bound(index: usize, bound: usize, kind: SlotBound) -> Result<(), ConfigError> {
    if index < bound {
        Ok(())
    } else {
        Err(ConfigError::SlotOutOfRange {
            slot: index,
            bound,
            kind,
        })
    }
}

fn push_targets(args: &mut Vec<String>, run: &RunConfig) {
    args.extend([
        "--cst".to_string(),
        run.coins_stored_target.to_string(),
        "--cdt".to_string(),
        run.coins_destroyed_target.to_string(),
    ]);
}

fn push_outputs(args: &mut Vec<String>, phase: Phase, outputs: &OutputPaths) {
    let flags = match phase {
        Phase::Train => ["--tpp", "--tlp", "--tsp"],
        Phase::Eval => ["--epp", "--elp", "--esp"],
    };

    for (flag, path) in flags.into_iter().zip(outputs.iter()) {
        args.push(flag.to_string());
        args.push(path.to_string());
    }
}
