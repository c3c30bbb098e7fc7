use burn::prelude::*;
use rand::Rng;

use crate::model::bridge::tensor_to_f64;
use crate::model::functional::log_sum_exp;

/// Operations shared by the binary RBM and its purification variant.
///
/// `effective_energy(v)` is the log of the unnormalized marginal
/// probability of `v` with every latent unit summed out.
pub trait EnergyModel<B: Backend> {
    fn num_visible(&self) -> usize;

    /// Log unnormalized marginal of each row of `v`, shape `(batch,)`.
    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Run `k` rounds of block Gibbs sampling starting from `v0`.
    fn gibbs_steps<R: Rng + ?Sized>(&self, k: usize, v0: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2>;

    /// `log Z` over an enumerated space, as a one-element tensor.
    fn log_partition_function(&self, space: Tensor<B, 2>) -> Tensor<B, 1> {
        log_sum_exp(self.effective_energy(space))
    }

    /// `Z = sum(exp(effective_energy))` over an enumerated space.
    fn compute_partition_function(&self, space: Tensor<B, 2>) -> f64 {
        tensor_to_f64(self.log_partition_function(space)).exp()
    }
}
