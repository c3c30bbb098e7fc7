//! TOML config loading for the `train` subcommand.
//!
//! Deserializes `configs/train.toml` (`[model]`, `[fit]`, `[optimizer]`,
//! `[metrics]`, `[early_stopping]`, `[checkpoint]`), then merges with CLI
//! overrides. Every section and field is optional.

use std::path::Path;

use anyhow::Context;
use rbm::observables::{check_sampling, Observable};
use rbm::training::{ChangeCriterion, FitConfig, LrSchedule};
use rbm::StateKind;
use serde::Deserialize;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct TrainToml {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub fit: FitSection,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    /// Early stopping is off unless the section is present.
    pub early_stopping: Option<EarlyStoppingSection>,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub kind: StateKind,
    /// Hidden units; defaults to the number of sites.
    pub num_hidden: Option<usize>,
    /// Auxiliary units of a density matrix; defaults to the number of sites.
    pub num_aux: Option<usize>,
    pub init_scale: f64,
    /// Most rotated sites allowed in one measurement.
    pub max_rotated_sites: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            kind: StateKind::Complex,
            num_hidden: None,
            num_aux: None,
            init_scale: 1.0,
            max_rotated_sites: rbm::unitaries::DEFAULT_MAX_ROTATED_SITES,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FitSection {
    pub epochs: usize,
    pub pos_batch_size: usize,
    pub neg_batch_size: Option<usize>,
    pub k: usize,
    pub lr: f64,
    pub schedule: LrSchedule,
    pub seed: u64,
    pub log_interval: usize,
    pub shuffle: bool,
    /// Tempered replicas of the negative-phase chains; 1 is plain Gibbs.
    pub num_temperatures: usize,
    /// Inverse temperature of the hottest replica.
    pub min_inverse_temperature: f64,
    /// Keep the chains between batches instead of restarting from data.
    pub persistent_chains: bool,
}

impl Default for FitSection {
    fn default() -> Self {
        Self {
            epochs: 100,
            pos_batch_size: 100,
            neg_batch_size: None,
            k: 10,
            lr: 1e-2,
            schedule: LrSchedule::Constant,
            seed: 0,
            log_interval: 10,
            shuffle: true,
            num_temperatures: 4,
            min_inverse_temperature: 0.0,
            persistent_chains: true,
        }
    }
}

impl FitSection {
    pub fn to_fit_config(&self) -> FitConfig {
        FitConfig::new()
            .with_epochs(self.epochs)
            .with_pos_batch_size(self.pos_batch_size)
            .with_neg_batch_size(self.neg_batch_size)
            .with_k(self.k)
            .with_lr(self.lr)
            .with_schedule(self.schedule)
            .with_seed(self.seed)
            .with_log_interval(self.log_interval)
            .with_shuffle(self.shuffle)
            .with_num_temperatures(self.num_temperatures)
            .with_min_inverse_temperature(self.min_inverse_temperature)
            .with_persistent_chains(self.persistent_chains)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Sgd,
    Adam,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OptimizerSection {
    pub kind: OptimizerKind,
    /// SGD momentum; plain SGD when absent.
    pub momentum: Option<f64>,
    pub weight_decay: Option<f64>,
    /// Gradient-norm clipping threshold.
    pub max_grad_norm: Option<f64>,
}

/// An observable estimated from Gibbs samples at every evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservableEntry {
    pub name: String,
    pub observable: Observable,
    #[serde(default = "default_observable_samples")]
    pub num_samples: usize,
    #[serde(default = "default_observable_k")]
    pub k: usize,
}

fn default_observable_samples() -> usize {
    1000
}

fn default_observable_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Epochs between evaluations.
    pub period: usize,
    /// Fidelity against `--target` (skipped without one).
    pub fidelity: bool,
    /// KL divergence against `--target` over the basis list.
    pub kl: bool,
    /// Negative log-likelihood of the training data.
    pub nll: bool,
    pub observables: Vec<ObservableEntry>,
    /// Log every evaluation.
    pub verbose: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            period: 10,
            fidelity: true,
            kl: true,
            nll: false,
            observables: Vec::new(),
            verbose: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingSection {
    pub metric: String,
    pub period: usize,
    pub tolerance: f64,
    pub patience: usize,
    pub criterion: ChangeCriterion,
    /// Compare changes against the metric's variance instead.
    pub variance_based: bool,
    /// Series holding the variance, e.g. `energy_variance`.
    pub variance_metric: Option<String>,
}

impl Default for EarlyStoppingSection {
    fn default() -> Self {
        Self {
            metric: "kl".to_string(),
            period: 10,
            tolerance: 1e-3,
            patience: 3,
            criterion: ChangeCriterion::Relative,
            variance_based: false,
            variance_metric: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// Epochs between snapshots; no periodic snapshots when absent.
    pub period: Option<usize>,
    pub keyed_by_epoch: bool,
    pub save_initial: bool,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            period: None,
            keyed_by_epoch: true,
            save_initial: false,
        }
    }
}

/// CLI flags that override TOML values.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrainOverrides {
    pub epochs: Option<usize>,
    pub seed: Option<u64>,
    pub kind: Option<StateKind>,
    pub run_index: Option<u64>,
}

impl TrainToml {
    /// Reject settings that would only fail once training is under way.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fit.to_fit_config().validate()?;
        for entry in &self.metrics.observables {
            check_sampling(entry.num_samples, entry.k).with_context(|| format!("observable {:?}", entry.name))?;
        }
        Ok(())
    }
}

/// Load, deserialize and validate a `TrainToml`. A missing path gives the
/// defaults.
pub fn load_train_toml(path: Option<&Path>) -> anyhow::Result<TrainToml> {
    let Some(path) = path else {
        return Ok(TrainToml::default());
    };
    let contents = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded train config");
    Ok(config)
}

/// Apply CLI overrides. Priority: defaults < TOML values < CLI flags.
///
/// `run_index` is added to the seed so array jobs draw independent runs.
pub fn apply_overrides(config: &mut TrainToml, overrides: TrainOverrides) {
    if let Some(epochs) = overrides.epochs {
        config.fit.epochs = epochs;
    }
    if let Some(seed) = overrides.seed {
        config.fit.seed = seed;
    }
    if let Some(kind) = overrides.kind {
        config.model.kind = kind;
    }
    if let Some(index) = overrides.run_index {
        config.fit.seed = config.fit.seed.wrapping_add(index);
    }
}
