//! Negative-phase chains with replica exchange (parallel tempering).
//!
//! One replica of `batch` chains runs at each inverse temperature
//! `beta_0 = 1 > beta_1 > ... >= beta_min`. A replica at `beta` samples the
//! state's computational-basis distribution with every amplitude parameter
//! scaled by `beta`, so hot replicas move freely between modes that the
//! `beta = 1` chains cannot cross. After each Gibbs sweep, neighbouring
//! replicas propose to exchange configurations row by row, accepted with
//! the Metropolis probability
//!
//! ```text
//! min(1, exp(F_m(y) + F_{m+1}(x) - F_m(x) - F_{m+1}(y)))
//! ```
//!
//! where `F_m` is the effective energy at `beta_m` and `x`, `y` the two
//! rows. The `beta = 1` replica provides the negative-phase samples.

use burn::prelude::*;
use rand::Rng;

use crate::error::RbmError;
use crate::model::bridge::{configs_to_tensor, tensor_to_configs, tensor_to_vec};
use crate::state::NeuralState;

/// `count` inverse temperatures spaced linearly from 1 down to `min_beta`.
pub fn inverse_temperatures(count: usize, min_beta: f64) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..count)
            .map(|m| 1.0 - (1.0 - min_beta) * m as f64 / (count - 1) as f64)
            .collect(),
    }
}

/// Replicas of Gibbs chains, one per inverse temperature.
#[derive(Debug, Clone)]
pub struct TemperedChains<B: Backend> {
    betas: Vec<f64>,
    replicas: Vec<Tensor<B, 2>>,
    accepted: Vec<usize>,
    attempted: Vec<usize>,
}

impl<B: Backend> TemperedChains<B> {
    /// `replicas[m]` holds the chains run at `betas[m]`; all replicas must
    /// have the same shape and `betas[0]` is the physical temperature.
    pub fn new(betas: Vec<f64>, replicas: Vec<Tensor<B, 2>>) -> Result<Self, RbmError> {
        if betas.is_empty() || betas.len() != replicas.len() {
            return Err(RbmError::InvalidConfig(format!(
                "need one replica per temperature, got {} temperatures and {} replicas",
                betas.len(),
                replicas.len()
            )));
        }
        let shape = replicas[0].dims();
        if replicas.iter().any(|r| r.dims() != shape) {
            return Err(RbmError::InvalidConfig("replicas must share one shape".to_string()));
        }
        let pairs = betas.len() - 1;
        Ok(Self {
            betas,
            replicas: replicas.into_iter().map(Tensor::detach).collect(),
            accepted: vec![0; pairs],
            attempted: vec![0; pairs],
        })
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn replicas(&self) -> &[Tensor<B, 2>] {
        &self.replicas
    }

    /// Chains at `beta = 1`.
    pub fn chains(&self) -> Tensor<B, 2> {
        self.replicas[0].clone()
    }

    /// Replace every replica, e.g. to restart the chains from data.
    pub fn reset(&mut self, replicas: impl IntoIterator<Item = Tensor<B, 2>>) {
        for (slot, replica) in self.replicas.iter_mut().zip(replicas) {
            *slot = replica.detach();
        }
    }

    /// Run `k` Gibbs steps on every replica under `state`, then one round
    /// of exchanges between neighbours. Returns the `beta = 1` chains.
    pub fn advance<S: NeuralState<B>, R: Rng + ?Sized>(&mut self, state: &S, k: usize, rng: &mut R) -> Tensor<B, 2> {
        let machines: Vec<S> = self.betas.iter().map(|&beta| state.tempered(beta)).collect();
        for (replica, machine) in self.replicas.iter_mut().zip(&machines) {
            *replica = machine.gibbs_sample(k, replica.clone(), rng).detach();
        }
        for m in 0..machines.len() - 1 {
            self.exchange(m, &machines[m], &machines[m + 1], rng);
        }
        self.chains()
    }

    /// Fraction of accepted exchanges between replicas `m` and `m + 1`,
    /// over the lifetime of the chains. NaN before the first attempt.
    pub fn acceptance_rates(&self) -> Vec<f64> {
        self.accepted
            .iter()
            .zip(&self.attempted)
            .map(|(&a, &n)| if n == 0 { f64::NAN } else { a as f64 / n as f64 })
            .collect()
    }

    fn exchange<S: NeuralState<B>, R: Rng + ?Sized>(&mut self, m: usize, cold: &S, hot: &S, rng: &mut R) {
        let x = self.replicas[m].clone();
        let y = self.replicas[m + 1].clone();
        let [_, num_sites] = x.dims();
        let device = x.device();

        let cold_x = tensor_to_vec(cold.effective_energy(x.clone()));
        let cold_y = tensor_to_vec(cold.effective_energy(y.clone()));
        let hot_x = tensor_to_vec(hot.effective_energy(x.clone()));
        let hot_y = tensor_to_vec(hot.effective_energy(y.clone()));

        let mut xs = tensor_to_configs(x);
        let mut ys = tensor_to_configs(y);
        let mut swapped = 0;
        for row in 0..xs.len() {
            let log_accept = cold_y[row] + hot_x[row] - cold_x[row] - hot_y[row];
            if log_accept >= 0.0 || rng.gen::<f64>() < log_accept.exp() {
                std::mem::swap(&mut xs[row], &mut ys[row]);
                swapped += 1;
            }
        }
        self.attempted[m] += xs.len();
        self.accepted[m] += swapped;
        if swapped > 0 {
            self.replicas[m] = configs_to_tensor(&xs, num_sites, &device);
            self.replicas[m + 1] = configs_to_tensor(&ys, num_sites, &device);
        }
    }
}
