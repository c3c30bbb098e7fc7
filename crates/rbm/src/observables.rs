//! Observables estimated from samples of an NN-state.
//!
//! Each observable has a local estimator `O_loc(s)` such that
//! `<O> = E_{s ~ p}[O_loc(s)]`, with `p(s)` the computational-basis
//! distribution. Off-diagonal terms use matrix-element ratios
//! `rho(s', s) / rho(s, s)`, which for a wavefunction reduce to
//! `psi(s') / psi(s)`.

use burn::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RbmError;
use crate::model::bridge::{configs_to_tensor, tensor_to_configs, tensor_to_vec};
use crate::state::NeuralState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observable {
    /// Average magnetization `(1/n) sum_j Z_j`, with `Z = +1` for a 1.
    SigmaZ {
        #[serde(default)]
        absolute: bool,
    },
    /// Average transverse magnetization `(1/n) sum_j X_j`.
    SigmaX,
    /// `H = -J sum Z_j Z_{j+1} - h sum X_j` on a chain.
    TransverseFieldIsing {
        coupling: f64,
        field: f64,
        #[serde(default)]
        periodic: bool,
        /// Report energy per site instead of the total.
        #[serde(default)]
        per_site: bool,
    },
}

/// Sample statistics of a local estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservableStats {
    pub mean: f64,
    pub variance: f64,
    pub std_error: f64,
    pub num_samples: usize,
}

impl ObservableStats {
    /// Mean, unbiased variance and standard error of `values`.
    pub fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                mean: f64::NAN,
                variance: f64::NAN,
                std_error: f64::NAN,
                num_samples: 0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        Self {
            mean,
            variance,
            std_error: (variance / n as f64).sqrt(),
            num_samples: n,
        }
    }
}

impl Observable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SigmaZ { absolute: false } => "sigma_z",
            Self::SigmaZ { absolute: true } => "abs_sigma_z",
            Self::SigmaX => "sigma_x",
            Self::TransverseFieldIsing { .. } => "tfim_energy",
        }
    }

    /// Local estimator for each row of `samples`.
    pub fn apply<B: Backend, S: NeuralState<B>>(&self, state: &S, samples: Tensor<B, 2>) -> Vec<f64> {
        let [_, n] = samples.dims();
        match *self {
            Self::SigmaZ { absolute } => {
                let magnetization = samples.mul_scalar(2.0).sub_scalar(1.0).mean_dim(1).squeeze::<1>(1);
                let values = tensor_to_vec(magnetization);
                if absolute {
                    values.into_iter().map(f64::abs).collect()
                } else {
                    values
                }
            }
            Self::SigmaX => flip_ratio_sums(state, samples)
                .into_iter()
                .map(|x| x / n as f64)
                .collect(),
            Self::TransverseFieldIsing {
                coupling,
                field,
                periodic,
                per_site,
            } => {
                let configs = tensor_to_configs(samples.clone());
                let flips = flip_ratio_sums(state, samples);
                configs
                    .iter()
                    .zip(flips)
                    .map(|(config, flip)| {
                        let spin = |j: usize| if config[j] == 1 { 1.0 } else { -1.0 };
                        let bonds = if periodic && n > 2 { n } else { n.saturating_sub(1) };
                        let zz: f64 = (0..bonds).map(|j| spin(j) * spin((j + 1) % n)).sum();
                        let energy = -coupling * zz - field * flip;
                        if per_site {
                            energy / n as f64
                        } else {
                            energy
                        }
                    })
                    .collect()
            }
        }
    }

    pub fn statistics<B: Backend, S: NeuralState<B>>(&self, state: &S, samples: Tensor<B, 2>) -> ObservableStats {
        ObservableStats::from_values(&self.apply(state, samples))
    }

    /// Draw `num_samples` Gibbs samples (`k` steps each) and estimate.
    pub fn sample_statistics<B: Backend, S: NeuralState<B>, R: Rng + ?Sized>(
        &self,
        state: &S,
        num_samples: usize,
        k: usize,
        rng: &mut R,
    ) -> Result<ObservableStats, RbmError> {
        check_sampling(num_samples, k)?;
        let samples = state.sample(num_samples, k, rng);
        Ok(self.statistics(state, samples))
    }
}

/// An estimate needs at least one sample drawn with at least one Gibbs step.
pub fn check_sampling(num_samples: usize, k: usize) -> Result<(), RbmError> {
    if num_samples == 0 {
        return Err(RbmError::InvalidConfig("observable num_samples must be at least 1".into()));
    }
    if k == 0 {
        return Err(RbmError::InvalidConfig("observable k must be at least 1".into()));
    }
    Ok(())
}

/// `sum_j Re rho(s^(j), s) / rho(s, s)` per sample, where `s^(j)` is `s`
/// with site `j` flipped.
fn flip_ratio_sums<B: Backend, S: NeuralState<B>>(state: &S, samples: Tensor<B, 2>) -> Vec<f64> {
    let [batch, n] = samples.dims();
    let device = samples.device();
    let configs = tensor_to_configs(samples.clone());
    let mut flipped = Vec::with_capacity(batch * n);
    let mut originals = Vec::with_capacity(batch * n);
    for config in &configs {
        for j in 0..n {
            let mut f = config.clone();
            f[j] ^= 1;
            flipped.push(f);
            originals.push(config.clone());
        }
    }
    let off_diagonal = state.log_rho(
        configs_to_tensor(&flipped, n, &device),
        configs_to_tensor(&originals, n, &device),
    );
    let diagonal = tensor_to_vec(state.effective_energy(samples));
    let log_modulus = tensor_to_vec(off_diagonal.log_modulus);
    let unit_re = tensor_to_vec(off_diagonal.unit.re);

    (0..batch)
        .map(|b| {
            (0..n)
                .map(|j| {
                    let idx = b * n + j;
                    (log_modulus[idx] - diagonal[b]).exp() * unit_re[idx]
                })
                .sum()
        })
        .collect()
}
