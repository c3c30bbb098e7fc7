//! Contrastive-divergence training loop shared by every NN-state variant.
//!
//! Each batch builds the surrogate objective
//! `mean E(v_k) - mean log p_b(sigma)`, where `sigma` are the batch's
//! measurement outcomes (each scored in its own basis) and `v_k` are
//! detached configurations of the negative-phase chains after `k` more
//! Gibbs steps. Its autodiff gradient is the CD estimate of the negative
//! log-likelihood gradient, which the supplied optimizer applies at the
//! scheduled learning rate.
//!
//! The chains persist across batches and epochs and are tempered: see
//! [`crate::training::tempering`]. Rotated-basis data rewards whichever
//! computational mode the model already favours, so chains that cannot
//! cross between modes let the fit collapse onto one of them.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use measurements::TrainingSet;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::RbmError;
use crate::model::bridge::{configs_to_tensor, tensor_to_f64};
use crate::model::functional::random_configs;
use crate::state::{log_prob_by_basis, NeuralState};
use crate::training::callbacks::{Callback, CallbackList, Signal};
use crate::training::metrics::MetricHistory;
use crate::training::tempering::{inverse_temperatures, TemperedChains};
use crate::unitaries::Unitaries;

/// Name of the per-epoch mean objective in the history.
pub const OBJECTIVE_METRIC: &str = "cd_objective";

/// Learning-rate schedule, evaluated once per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrSchedule {
    #[default]
    Constant,
    /// `lr * gamma^epoch`.
    Exponential { gamma: f64 },
    /// `lr * gamma^(epoch / step_size)`.
    Step { step_size: usize, gamma: f64 },
    /// Linear warmup then cosine decay to zero at the last epoch.
    WarmupCosine { warmup_epochs: usize },
}

impl LrSchedule {
    /// Learning rate for the zero-based `epoch` of a `total`-epoch run.
    pub fn lr_at(&self, base_lr: f64, epoch: usize, total: usize) -> f64 {
        match *self {
            Self::Constant => base_lr,
            Self::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),
            Self::Step { step_size, gamma } => base_lr * gamma.powi((epoch / step_size.max(1)) as i32),
            Self::WarmupCosine { warmup_epochs } => warmup_cosine(base_lr, warmup_epochs, total, epoch),
        }
    }
}

/// Warmup + cosine decay.
///
/// - Warmup (`step < warmup_steps`): linearly ramps from `base_lr / warmup` to `base_lr`.
/// - Cosine phase: decays from `base_lr` to 0.
pub fn warmup_cosine(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps) as f64 / decay_steps as f64).min(1.0);
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// Hyperparameters of a training run.
#[derive(Config, Debug)]
pub struct FitConfig {
    /// Number of passes over the data.
    #[config(default = 100)]
    pub epochs: usize,
    /// Measurement samples per positive-phase batch.
    #[config(default = 100)]
    pub pos_batch_size: usize,
    /// Gibbs chains per negative phase. Defaults to `pos_batch_size`.
    pub neg_batch_size: Option<usize>,
    /// Gibbs steps per chain.
    #[config(default = 1)]
    pub k: usize,
    /// Base learning rate handed to the optimizer.
    #[config(default = 1e-2)]
    pub lr: f64,
    #[config(default = "LrSchedule::Constant")]
    pub schedule: LrSchedule,
    /// Seed for shuffling and Gibbs chains.
    #[config(default = 0)]
    pub seed: u64,
    /// Epochs between progress log lines (0 disables them).
    #[config(default = 10)]
    pub log_interval: usize,
    /// Reshuffle the data every epoch.
    #[config(default = true)]
    pub shuffle: bool,
    /// Replicas of the negative-phase chains, at inverse temperatures
    /// spaced linearly from 1 to `min_inverse_temperature`. With 1 the
    /// chains are plain Gibbs chains.
    #[config(default = 4)]
    pub num_temperatures: usize,
    #[config(default = 0.0)]
    pub min_inverse_temperature: f64,
    /// Keep the chains between batches; otherwise every batch restarts
    /// them from data.
    #[config(default = true)]
    pub persistent_chains: bool,
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), RbmError> {
        if self.epochs == 0 {
            return Err(RbmError::InvalidConfig("epochs must be at least 1".to_string()));
        }
        if self.k == 0 {
            return Err(RbmError::InvalidConfig("k must be at least 1".to_string()));
        }
        if self.pos_batch_size == 0 {
            return Err(RbmError::InvalidConfig("pos_batch_size must be at least 1".to_string()));
        }
        if self.neg_batch_size == Some(0) {
            return Err(RbmError::InvalidConfig("neg_batch_size must be at least 1".to_string()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(RbmError::InvalidConfig(format!("lr must be positive, got {}", self.lr)));
        }
        if self.num_temperatures == 0 {
            return Err(RbmError::InvalidConfig("num_temperatures must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.min_inverse_temperature) {
            return Err(RbmError::InvalidConfig(format!(
                "min_inverse_temperature must lie in [0, 1), got {}",
                self.min_inverse_temperature
            )));
        }
        Ok(())
    }

    pub fn effective_neg_batch_size(&self) -> usize {
        self.neg_batch_size.unwrap_or(self.pos_batch_size)
    }
}

/// Trained state and what happened along the way.
#[derive(Debug)]
pub struct FitOutcome<S> {
    pub state: S,
    pub history: MetricHistory,
    pub epochs_completed: usize,
    pub stopped_early: bool,
}

/// Objective average over an epoch.
struct EpochStats {
    objective: f64,
    count: usize,
}

impl EpochStats {
    fn new() -> Self {
        Self { objective: 0.0, count: 0 }
    }

    fn update(&mut self, objective: f64) {
        self.objective += objective;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.objective / self.count as f64
        }
    }
}

/// Starting points of the negative-phase chains: computational-basis rows
/// drawn with replacement, or uniform configurations when there are none.
fn negative_chain_starts<B: Backend, R: Rng + ?Sized>(
    data: &TrainingSet,
    computational: &[usize],
    batch: usize,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 2> {
    if computational.is_empty() {
        return random_configs(batch, data.num_sites(), rng, device);
    }
    let rows: Vec<Vec<u8>> = (0..batch)
        .map(|_| data.samples()[computational[rng.gen_range(0..computational.len())]].clone())
        .collect();
    configs_to_tensor(&rows, data.num_sites(), device)
}

fn validate_inputs<B: Backend, S: NeuralState<B>>(
    config: &FitConfig,
    state: &S,
    data: &TrainingSet,
    unitaries: &Unitaries,
) -> Result<(), RbmError> {
    config.validate()?;
    if data.num_sites() != state.num_visible() {
        return Err(RbmError::ShapeMismatch {
            expected: state.num_visible(),
            found: data.num_sites(),
        });
    }
    unitaries.validate_bases(data.bases())?;
    for basis in data.unique_bases() {
        unitaries.rotated_sites(&basis)?;
    }
    Ok(())
}

/// Train `state` on `data` by contrastive divergence.
///
/// Epochs are numbered from 1. After every epoch the callbacks run in
/// order; training ends after `config.epochs` epochs or as soon as one of
/// them returns [`Signal::Stop`]. A non-finite objective aborts with
/// [`RbmError::NonFinite`].
pub fn fit<B, S, O>(
    config: &FitConfig,
    mut state: S,
    data: &TrainingSet,
    unitaries: &Unitaries,
    optimizer: &mut O,
    callbacks: &mut CallbackList<'_, S>,
) -> anyhow::Result<FitOutcome<S>>
where
    B: AutodiffBackend,
    S: NeuralState<B> + AutodiffModule<B>,
    O: Optimizer<S, B>,
{
    validate_inputs(config, &state, data, unitaries)?;

    let device = state.device();
    let neg_batch_size = config.effective_neg_batch_size();
    let computational = data.computational_indices();
    if computational.is_empty() {
        tracing::warn!("No computational-basis samples; negative chains start from uniform configurations");
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..data.len()).collect();
    let mut history = MetricHistory::new();
    let num_batches = data.len().div_ceil(config.pos_batch_size);

    let betas = inverse_temperatures(config.num_temperatures, config.min_inverse_temperature);
    let starts = |rng: &mut StdRng| {
        (0..config.num_temperatures)
            .map(|_| negative_chain_starts::<B, _>(data, &computational, neg_batch_size, rng, &device))
            .collect::<Vec<_>>()
    };
    let mut chains = TemperedChains::new(betas, starts(&mut rng))?;

    tracing::info!(
        kind = %state.kind(),
        samples = data.len(),
        sites = data.num_sites(),
        epochs = config.epochs,
        batches = num_batches,
        k = config.k,
        temperatures = config.num_temperatures,
        persistent = config.persistent_chains,
        "Starting training"
    );

    callbacks.on_train_start(&state)?;
    let train_start = Instant::now();
    let mut epochs_completed = 0;
    let mut stopped_early = false;

    for epoch in 1..=config.epochs {
        let lr = config.schedule.lr_at(config.lr, epoch - 1, config.epochs);
        callbacks.on_epoch_start(&state, epoch)?;
        if config.shuffle {
            indices.shuffle(&mut rng);
        }

        let mut stats = EpochStats::new();
        for (batch, chunk) in indices.chunks(config.pos_batch_size).enumerate() {
            callbacks.on_batch_start(&state, epoch, batch)?;

            let (samples, bases) = data.select(chunk);
            let positive = log_prob_by_basis(&state, &samples, &bases, unitaries)?.mean();

            if !config.persistent_chains {
                chains.reset(starts(&mut rng));
            }
            let vk = chains.advance(&state, config.k, &mut rng);
            let negative = state.effective_energy(vk).mean();

            let objective = negative - positive;
            let value = tensor_to_f64(objective.clone());
            if !value.is_finite() {
                tracing::error!(epoch, batch, value, "Non-finite training objective");
                return Err(RbmError::NonFinite { epoch, batch }.into());
            }
            stats.update(value);

            let grads = GradientsParams::from_grads(objective.backward(), &state);
            state = optimizer.step(lr, state, grads);

            callbacks.on_batch_end(&state, epoch, batch)?;
        }

        let objective = stats.mean();
        history.push(OBJECTIVE_METRIC, epoch, objective);
        epochs_completed = epoch;

        if config.log_interval > 0 && (epoch % config.log_interval == 0 || epoch == config.epochs) {
            tracing::info!(
                epoch,
                lr = format!("{lr:.3e}"),
                objective = format!("{objective:.5}"),
                elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
                "Epoch complete"
            );
            if config.num_temperatures > 1 {
                tracing::debug!(epoch, swap_acceptance = ?chains.acceptance_rates(), "Replica exchange");
            }
        }

        if callbacks.on_epoch_end(&state, epoch, &mut history)? == Signal::Stop {
            stopped_early = epoch < config.epochs;
            tracing::info!(epoch, "Training stopped by callback");
            break;
        }
    }

    callbacks.on_train_end(&state, &history)?;
    tracing::info!(
        epochs = epochs_completed,
        stopped_early,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training complete"
    );

    Ok(FitOutcome {
        state,
        history,
        epochs_completed,
        stopped_early,
    })
}
