//! Numerically stable tensor primitives shared by the energy models:
//! softplus, log-sum-exp, Bernoulli sampling and seeded normal draws.

use burn::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::model::bridge::values_to_tensor;

/// `log(1 + exp(x))` without overflow for large `x`.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.abs().neg().exp().log1p()
}

/// `log(sum(exp(x)))` over a 1D tensor, returned as a one-element tensor.
pub fn log_sum_exp<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let shift = x.clone().max().detach();
    (x - shift.clone()).exp().sum().log() + shift
}

/// Draw independent Bernoulli variables with the given success
/// probabilities. The result carries no gradient.
pub fn bernoulli<B: Backend, const D: usize, R: Rng + ?Sized>(
    probs: Tensor<B, D>,
    rng: &mut R,
) -> Tensor<B, D> {
    let dims = probs.dims();
    let count: usize = dims.iter().product();
    let uniform: Vec<f64> = (0..count).map(|_| rng.gen::<f64>()).collect();
    let uniform = values_to_tensor::<B, D>(uniform, dims, &probs.device());
    probs.detach().greater(uniform).float()
}

/// Uniformly random binary configurations of shape `(batch, num_sites)`.
pub fn random_configs<B: Backend, R: Rng + ?Sized>(
    batch: usize,
    num_sites: usize,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 2> {
    let values: Vec<f64> = (0..batch * num_sites)
        .map(|_| if rng.gen::<bool>() { 1.0 } else { 0.0 })
        .collect();
    values_to_tensor(values, [batch, num_sites], device)
}

/// Tensor of independent `N(0, std^2)` draws taken from `rng`.
pub fn random_normal<B: Backend, const D: usize, R: Rng + ?Sized>(
    dims: [usize; D],
    std: f64,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, D> {
    let count: usize = dims.iter().product();
    let values: Vec<f64> = match Normal::new(0.0, std) {
        Ok(normal) => (0..count).map(|_| normal.sample(rng)).collect(),
        // Non-finite or negative std: fall back to zeros.
        Err(_) => vec![0.0; count],
    };
    values_to_tensor(values, dims, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::{tensor_to_f64, tensor_to_vec};
    use burn::backend::ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f64>;

    #[test]
    fn test_softplus_is_stable() {
        let device = Default::default();
        let x = values_to_tensor::<TestBackend, 1>(vec![-800.0, -1.0, 0.0, 2.0, 800.0], [5], &device);
        let y = tensor_to_vec(softplus(x));

        assert!(y.iter().all(|v| v.is_finite()));
        assert!(y[0] >= 0.0 && y[0] < 1e-300);
        assert!((y[1] - (1.0 + (-1.0f64).exp()).ln()).abs() < 1e-12);
        assert!((y[2] - 2.0f64.ln()).abs() < 1e-12);
        assert!((y[3] - (1.0 + 2.0f64.exp()).ln()).abs() < 1e-12);
        assert!((y[4] - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_log_sum_exp_matches_naive_and_survives_large_values() {
        let device = Default::default();
        let values = vec![0.3, -1.2, 2.5];
        let naive = values.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        let x = values_to_tensor::<TestBackend, 1>(values, [3], &device);
        assert!((tensor_to_f64(log_sum_exp(x)) - naive).abs() < 1e-12);

        let big = values_to_tensor::<TestBackend, 1>(vec![1000.0, 1000.0], [2], &device);
        let lse = tensor_to_f64(log_sum_exp(big));
        assert!((lse - (1000.0 + 2.0f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_bernoulli_extremes_and_binary_output() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(7);
        let probs = values_to_tensor::<TestBackend, 2>(vec![0.0, 1.0, 0.5, 0.5], [2, 2], &device);
        for _ in 0..20 {
            let draw = tensor_to_vec(bernoulli(probs.clone(), &mut rng));
            assert_eq!(draw[0], 0.0);
            assert_eq!(draw[1], 1.0);
            assert!(draw.iter().all(|&v| v == 0.0 || v == 1.0));
        }
    }

    #[test]
    fn test_random_normal_is_seeded() {
        let device = Default::default();
        let a = tensor_to_vec(random_normal::<TestBackend, 2, _>(
            [3, 4],
            0.5,
            &mut StdRng::seed_from_u64(11),
            &device,
        ));
        let b = tensor_to_vec(random_normal::<TestBackend, 2, _>(
            [3, 4],
            0.5,
            &mut StdRng::seed_from_u64(11),
            &device,
        ));
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 0.0));
    }
}
