use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_LR_ACTOR: f64 = 0.0001;
const DEFAULT_LR_CRITIC: f64 = 0.0004;

fn default_lr_actor() -> f64 {
    DEFAULT_LR_ACTOR
}

fn default_lr_critic() -> f64 {
    DEFAULT_LR_CRITIC
}

/// Hyperparameters shared by every slot of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub episodes: usize,
    pub max_episodes: usize,
    pub batch_size: usize,
    #[serde(default)]
    pub train_iterations: Option<usize>,
    pub actor_layers: Vec<usize>,
    pub critic_layers: Vec<usize>,
    #[serde(default = "default_lr_actor")]
    pub lr_actor: f64,
    #[serde(default = "default_lr_critic")]
    pub lr_critic: f64,
    pub coins_stored_target: usize,
    pub coins_destroyed_target: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            max_episodes: 100,
            batch_size: 30,
            train_iterations: Some(100),
            actor_layers: vec![1000, 600],
            critic_layers: vec![1000, 600],
            lr_actor: DEFAULT_LR_ACTOR,
            lr_critic: DEFAULT_LR_CRITIC,
            coins_stored_target: 50,
            coins_destroyed_target: 60,
        }
    }
}

impl RunConfig {
    /// Checks the constraints the types alone don't express.
    ///
    /// # Errors
    /// Returns a `ConfigError` naming the first invalid parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_layers("actor_layers", &self.actor_layers)?;
        check_layers("critic_layers", &self.critic_layers)?;
        check_lr("lr_actor", self.lr_actor)?;
        check_lr("lr_critic", self.lr_critic)
    }
}

fn check_layers(name: &'static str, layers: &[usize]) -> Result<(), ConfigError> {
    if layers.is_empty() {
        return Err(ConfigError::EmptyLayers(name));
    }

    match layers.iter().position(|&size| size == 0) {
        Some(index) => Err(ConfigError::ZeroLayerSize {
            layers: name,
            index,
        }),
        None => Ok(()),
    }
}

fn check_lr(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidLearningRate { name, value })
    }
}

/// The trainer/evaluator binary and the fixed arguments placed before the
/// resolved ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Executable {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for Executable {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["run".to_string(), "--".to_string()],
        }
    }
}

/// Where inputs are read from and outputs are written to. Every path a slot
/// touches is derived from these prefixes and the slot index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathLayout {
    pub map_dir: PathBuf,
    pub maps: Vec<PathBuf>,
    pub model_prefix: PathBuf,
    pub train_prefix: PathBuf,
    pub eval_prefix: PathBuf,
}

impl Default for PathLayout {
    fn default() -> Self {
        Self {
            map_dir: PathBuf::from("src/save/maps"),
            maps: [
                "adj_danger_map.bin",
                "coin_bank_1_away_map.bin",
                "coin_bank_adj_map.bin",
                "test_normal_map.bin",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            model_prefix: PathBuf::from("src/save/models/model"),
            train_prefix: PathBuf::from("src/save/train/train"),
            eval_prefix: PathBuf::from("src/save/eval/eval"),
        }
    }
}

/// Everything one scheduling run needs, as loaded from disk.
///
/// Only `run` is required in the JSON form; `layout` and `executable` fall
/// back to their defaults.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub layout: PathLayout,
    #[serde(default)]
    pub executable: Executable,
}

impl SchedulerConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed JSON, missing required fields
    /// or out-of-type values, and the validation error otherwise.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, or any error
    /// `from_json_str` reports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&content)
    }

    /// Checks the parts of the configuration every slot shares.
    ///
    /// The map count is not checked here: a slot past the end of the map
    /// sequence fails on its own when it is resolved.
    ///
    /// # Errors
    /// Returns a `ConfigError` naming the first invalid parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        self.layout.validate()?;
        self.executable.validate()
    }
}

impl PathLayout {
    /// # Errors
    /// Returns `ConfigError::SharedOutputPrefix` if train and eval outputs
    /// would land on the same files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.train_prefix == self.eval_prefix {
            return Err(ConfigError::SharedOutputPrefix(self.train_prefix.clone()));
        }
        Ok(())
    }
}

impl Executable {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        Ok(())
    }
}
