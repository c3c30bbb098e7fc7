//! Basis-rotation expansion of measurement samples.
//!
//! A sample `s` measured in basis `b` has probability
//!
//! ```text
//! wavefunction:   |sum_{s'} prod_j U_j[s_j, s'_j] psi(s')|^2
//! density matrix: Re sum_{s', s''} prod_j U_j[s_j, s'_j] conj(U_j[s_j, s''_j]) rho(s', s'')
//! ```
//!
//! where only rotated sites `j` vary. Both sums are evaluated in log space
//! with a per-sample max shift so large effective energies do not overflow.

use burn::prelude::*;
use measurements::Basis;
use num_complex::Complex64;

use crate::error::RbmError;
use crate::model::bridge::configs_to_tensor;
use crate::model::cplx::{ComplexTensor, PolarTensor};
use crate::state::{NeuralState, Wavefunction};
use crate::unitaries::{Unitaries, Unitary};

/// Computational configurations and weights contributing to each sample.
///
/// Entries are grouped per sample: sample `g` owns indices
/// `g * terms .. (g + 1) * terms`.
#[derive(Debug, Clone)]
pub struct WavefunctionExpansion {
    pub terms: usize,
    pub configs: Vec<Vec<u8>>,
    pub weights: Vec<Complex64>,
}

/// Pairs of computational configurations and weights contributing to each
/// sample of a density matrix.
#[derive(Debug, Clone)]
pub struct DensityExpansion {
    pub terms: usize,
    pub rows: Vec<Vec<u8>>,
    pub cols: Vec<Vec<u8>>,
    pub weights: Vec<Complex64>,
}

/// Every assignment of the rotated sites, with its product of unitary
/// entries, for one sample.
fn branches(sample: &[u8], rotated: &[(usize, Unitary)]) -> Vec<(Vec<u8>, Complex64)> {
    let r = rotated.len();
    (0..1usize << r)
        .map(|mask| {
            let mut config = sample.to_vec();
            let mut weight = Complex64::new(1.0, 0.0);
            for (bit, (site, unitary)) in rotated.iter().enumerate() {
                let value = ((mask >> (r - 1 - bit)) & 1) as u8;
                weight *= unitary.get(usize::from(sample[*site]), usize::from(value));
                config[*site] = value;
            }
            (config, weight)
        })
        .collect()
}

pub fn expand_wavefunction(
    samples: &[Vec<u8>],
    basis: &Basis,
    unitaries: &Unitaries,
) -> Result<WavefunctionExpansion, RbmError> {
    let rotated = unitaries.rotated_sites(basis)?;
    let terms = 1usize << rotated.len();
    let mut configs = Vec::with_capacity(samples.len() * terms);
    let mut weights = Vec::with_capacity(samples.len() * terms);
    for sample in samples {
        for (config, weight) in branches(sample, &rotated) {
            configs.push(config);
            weights.push(weight);
        }
    }
    Ok(WavefunctionExpansion {
        terms,
        configs,
        weights,
    })
}

pub fn expand_density(
    samples: &[Vec<u8>],
    basis: &Basis,
    unitaries: &Unitaries,
) -> Result<DensityExpansion, RbmError> {
    let rotated = unitaries.rotated_sites(basis)?;
    let terms = 1usize << (2 * rotated.len());
    let mut rows = Vec::with_capacity(samples.len() * terms);
    let mut cols = Vec::with_capacity(samples.len() * terms);
    let mut weights = Vec::with_capacity(samples.len() * terms);
    for sample in samples {
        let branches = branches(sample, &rotated);
        for (row, w_row) in &branches {
            for (col, w_col) in &branches {
                rows.push(row.clone());
                cols.push(col.clone());
                weights.push(w_row * w_col.conj());
            }
        }
    }
    Ok(DensityExpansion {
        terms,
        rows,
        cols,
        weights,
    })
}

fn check_batch(samples: &[Vec<u8>], basis: &Basis, num_visible: usize) -> Result<(), RbmError> {
    if samples.is_empty() {
        return Err(RbmError::InvalidConfig("empty sample batch".to_string()));
    }
    if basis.num_sites() != num_visible {
        return Err(RbmError::ShapeMismatch {
            expected: num_visible,
            found: basis.num_sites(),
        });
    }
    if let Some(bad) = samples.iter().find(|s| s.len() != num_visible) {
        return Err(RbmError::ShapeMismatch {
            expected: num_visible,
            found: bad.len(),
        });
    }
    Ok(())
}

/// `log |sum_t w_t z_t|^2` per group of `terms` consecutive entries.
fn log_abs_sq_of_sum<B: Backend>(
    values: PolarTensor<B, 1>,
    weights: ComplexTensor<B, 1>,
    groups: usize,
    terms: usize,
) -> Tensor<B, 1> {
    let (shift, sum) = shifted_sum(values, weights, groups, terms);
    (sum.norm_sqr().log() + shift.mul_scalar(2.0)).squeeze::<1>(1)
}

/// `log Re(sum_t w_t z_t)` per group of `terms` consecutive entries.
fn log_real_of_sum<B: Backend>(
    values: PolarTensor<B, 1>,
    weights: ComplexTensor<B, 1>,
    groups: usize,
    terms: usize,
) -> Tensor<B, 1> {
    let (shift, sum) = shifted_sum(values, weights, groups, terms);
    (sum.re.log() + shift).squeeze::<1>(1)
}

/// Returns the per-group shift `m` (shape `(groups, 1)`) and
/// `sum_t w_t exp(log|z_t| - m) unit_t`.
fn shifted_sum<B: Backend>(
    values: PolarTensor<B, 1>,
    weights: ComplexTensor<B, 1>,
    groups: usize,
    terms: usize,
) -> (Tensor<B, 2>, ComplexTensor<B, 2>) {
    let values = values.reshape([groups, terms]);
    let shift = values.log_modulus.clone().max_dim(1).detach();
    let scale = (values.log_modulus - shift.clone()).exp();
    let sum = weights
        .reshape([groups, terms])
        .mul(values.unit)
        .scale(scale)
        .sum_dim(1);
    (shift, sum)
}

/// Log-probability of each sample of a wavefunction measured in `basis`.
pub fn wavefunction_log_prob<B: Backend, S: Wavefunction<B>>(
    state: &S,
    samples: &[Vec<u8>],
    basis: &Basis,
    unitaries: &Unitaries,
) -> Result<Tensor<B, 1>, RbmError> {
    let n = state.num_visible();
    check_batch(samples, basis, n)?;
    let device = state.device();
    if basis.is_computational() {
        return Ok(state.effective_energy(configs_to_tensor(samples, n, &device)));
    }

    let expansion = expand_wavefunction(samples, basis, unitaries)?;
    let log_psi = state.log_psi(configs_to_tensor(&expansion.configs, n, &device));
    let weights = ComplexTensor::from_host(&expansion.weights, [expansion.weights.len()], &device);
    Ok(log_abs_sq_of_sum(log_psi, weights, samples.len(), expansion.terms))
}

/// Log-probability (unnormalized) of each sample of a density matrix
/// measured in `basis`.
pub fn density_log_prob<B: Backend, S: NeuralState<B>>(
    state: &S,
    samples: &[Vec<u8>],
    basis: &Basis,
    unitaries: &Unitaries,
) -> Result<Tensor<B, 1>, RbmError> {
    let n = state.num_visible();
    check_batch(samples, basis, n)?;
    let device = state.device();
    if basis.is_computational() {
        return Ok(state.effective_energy(configs_to_tensor(samples, n, &device)));
    }

    let expansion = expand_density(samples, basis, unitaries)?;
    let log_rho = state.log_rho(
        configs_to_tensor(&expansion.rows, n, &device),
        configs_to_tensor(&expansion.cols, n, &device),
    );
    let weights = ComplexTensor::from_host(&expansion.weights, [expansion.weights.len()], &device);
    Ok(log_real_of_sum(log_rho, weights, samples.len(), expansion.terms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavefunction_expansion_enumerates_rotated_sites() {
        let unitaries = Unitaries::standard();
        let basis = Basis::parse("XZX").unwrap();
        let expansion = expand_wavefunction(&[vec![1, 0, 0]], &basis, &unitaries).unwrap();

        assert_eq!(expansion.terms, 4);
        let configs: Vec<&[u8]> = expansion.configs.iter().map(Vec::as_slice).collect();
        assert_eq!(configs, vec![&[0, 0, 0][..], &[0, 0, 1], &[1, 0, 0], &[1, 0, 1]]);

        // U_X[1][s0] * U_X[0][s2]: the only negative entry is U_X[1][1].
        let half = 0.5;
        let expected = [half, half, -half, -half];
        for (w, e) in expansion.weights.iter().zip(expected) {
            assert!((w.re - e).abs() < 1e-12 && w.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_density_expansion_weights_are_outer_products() {
        let unitaries = Unitaries::standard();
        let basis = Basis::parse("YZ").unwrap();
        let samples = vec![vec![1, 1], vec![0, 0]];
        let wf = expand_wavefunction(&samples, &basis, &unitaries).unwrap();
        let dm = expand_density(&samples, &basis, &unitaries).unwrap();

        assert_eq!(dm.terms, 4);
        assert_eq!(dm.rows.len(), 8);
        for g in 0..2 {
            for a in 0..2 {
                for b in 0..2 {
                    let idx = g * 4 + a * 2 + b;
                    let expected = wf.weights[g * 2 + a] * wf.weights[g * 2 + b].conj();
                    assert!((dm.weights[idx] - expected).norm() < 1e-12);
                    assert_eq!(dm.rows[idx], wf.configs[g * 2 + a]);
                    assert_eq!(dm.cols[idx], wf.configs[g * 2 + b]);
                }
            }
        }
    }

    #[test]
    fn test_expansion_respects_site_limit() {
        let unitaries = Unitaries::standard().with_max_rotated_sites(1);
        let basis = Basis::parse("XX").unwrap();
        assert!(matches!(
            expand_wavefunction(&[vec![0, 0]], &basis, &unitaries),
            Err(RbmError::TooManyRotatedSites { sites: 2, limit: 1 })
        ));
        assert!(expand_density(&[vec![0, 0]], &basis, &unitaries).is_err());
    }
}
