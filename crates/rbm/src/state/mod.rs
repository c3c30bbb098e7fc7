//! Neural-network quantum states built from RBMs.
//!
//! Three variants share the [`NeuralState`] capability trait:
//!
//! - [`PositiveWavefunction`]: real, non-negative amplitudes `exp(E_am / 2)`.
//! - [`ComplexWavefunction`]: amplitude and phase machines,
//!   `exp(E_am / 2 + i E_ph / 2)`.
//! - [`DensityMatrix`]: purification RBMs for mixed states.
//!
//! The trainer, callbacks and metrics are generic over the trait; each
//! variant supplies its own basis-rotation rule through
//! [`NeuralState::rotated_log_prob`].

pub mod complex;
pub mod density;
pub mod positive;
pub mod rotation;
pub mod snapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use measurements::{Basis, DataError};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RbmError;
use crate::exact::ExactState;
use crate::model::bridge::{configs_to_tensor, tensor_to_f64};
use crate::model::cplx::{ComplexTensor, PolarTensor};
use crate::model::functional::{log_sum_exp, random_configs};
use crate::unitaries::Unitaries;

pub use complex::{ComplexWavefunction, ComplexWavefunctionConfig};
pub use density::{DensityMatrix, DensityMatrixConfig};
pub use positive::{PositiveWavefunction, PositiveWavefunctionConfig};

/// Above this many sites, enumerating the Hilbert space logs a warning.
pub const HILBERT_SPACE_WARN_SITES: usize = 16;
/// Above this many sites, enumerating the Hilbert space is refused.
pub const HILBERT_SPACE_MAX_SITES: usize = 20;

/// Which NN-state variant a model or snapshot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Positive,
    Complex,
    Density,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Positive => "positive",
            Self::Complex => "complex",
            Self::Density => "density",
        };
        f.write_str(name)
    }
}

impl FromStr for StateKind {
    type Err = RbmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "complex" => Ok(Self::Complex),
            "density" | "density_matrix" => Ok(Self::Density),
            other => Err(RbmError::InvalidConfig(format!("unknown state kind {other:?}"))),
        }
    }
}

/// Capabilities shared by every NN-state variant.
pub trait NeuralState<B: Backend>: Module<B> {
    type Config: Config;

    fn kind(&self) -> StateKind;

    /// Config that rebuilds a state of the same shape.
    fn config(&self) -> Self::Config;

    fn from_config<R: Rng + ?Sized>(config: &Self::Config, rng: &mut R, device: &B::Device) -> Self;

    fn num_visible(&self) -> usize;

    fn device(&self) -> B::Device;

    /// Log of the unnormalized computational-basis probability of each row.
    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Matrix elements `<v|rho|v'>` row by row, unnormalized. For a
    /// wavefunction this is `psi(v) conj(psi(v'))`.
    fn log_rho(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>) -> PolarTensor<B, 1>;

    /// Unnormalized log-probability of each sample measured in `basis`.
    fn rotated_log_prob(
        &self,
        samples: &[Vec<u8>],
        basis: &Basis,
        unitaries: &Unitaries,
    ) -> Result<Tensor<B, 1>, RbmError>;

    /// Copy whose sampling machine is scaled to inverse temperature `beta`,
    /// so its effective energy and Gibbs chains follow the tempered
    /// computational-basis distribution. Phase parameters are untouched.
    fn tempered(&self, beta: f64) -> Self;

    /// `k` rounds of block Gibbs sampling from `v0`.
    fn gibbs_sample<R: Rng + ?Sized>(&self, k: usize, v0: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2>;

    /// Normalized host copy over an enumerated space.
    fn exact_state(&self, space: Tensor<B, 2>) -> ExactState;

    /// Draw `num_samples` configurations with `k` Gibbs steps from uniform
    /// random starting points.
    fn sample<R: Rng + ?Sized>(&self, num_samples: usize, k: usize, rng: &mut R) -> Tensor<B, 2> {
        let v0 = random_configs(num_samples, self.num_visible(), rng, &self.device());
        self.gibbs_sample(k, v0, rng)
    }

    /// `log(sum |psi|^2)` or `log Tr rho` over `space`, as a one-element tensor.
    fn log_normalization(&self, space: Tensor<B, 2>) -> Tensor<B, 1> {
        log_sum_exp(self.effective_energy(space))
    }

    fn compute_normalization(&self, space: Tensor<B, 2>) -> f64 {
        tensor_to_f64(self.log_normalization(space)).exp()
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        snapshot::save(self, path)
    }

    fn load(path: &Path, device: &B::Device) -> anyhow::Result<Self> {
        snapshot::load(path, device)
    }
}

/// Pure states with an amplitude and a phase.
pub trait Wavefunction<B: Backend>: NeuralState<B> {
    /// `log psi(v)` in polar form.
    fn log_psi(&self, v: Tensor<B, 2>) -> PolarTensor<B, 1>;

    fn phase(&self, v: Tensor<B, 2>) -> Tensor<B, 1>;

    /// `|psi(v)|`, unnormalized.
    fn amplitude(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        self.effective_energy(v).mul_scalar(0.5).exp()
    }

    fn psi(&self, v: Tensor<B, 2>) -> ComplexTensor<B, 1> {
        self.log_psi(v).to_complex()
    }
}

/// `psi(v) conj(psi(v'))` for any wavefunction.
pub(crate) fn wavefunction_log_rho<B: Backend, S: Wavefunction<B>>(
    state: &S,
    v: Tensor<B, 2>,
    vp: Tensor<B, 2>,
) -> PolarTensor<B, 1> {
    let left = state.log_psi(v);
    let right = state.log_psi(vp);
    PolarTensor {
        log_modulus: left.log_modulus + right.log_modulus,
        unit: left.unit.mul(right.unit.conj()),
    }
}

pub(crate) fn wavefunction_exact_state<B: Backend, S: Wavefunction<B>>(
    state: &S,
    space: Tensor<B, 2>,
) -> ExactState {
    ExactState::pure(state.log_psi(space).to_host_rescaled())
}

/// All `2^n` computational configurations, site 0 most significant.
pub fn hilbert_configs(num_sites: usize) -> Result<Vec<Vec<u8>>, RbmError> {
    if num_sites == 0 {
        return Err(RbmError::InvalidConfig("Hilbert space needs at least one site".to_string()));
    }
    if num_sites > HILBERT_SPACE_MAX_SITES {
        return Err(RbmError::HilbertSpaceTooLarge {
            num_sites,
            limit: HILBERT_SPACE_MAX_SITES,
        });
    }
    if num_sites > HILBERT_SPACE_WARN_SITES {
        tracing::warn!(num_sites, "Enumerating a large Hilbert space");
    }
    Ok((0..1usize << num_sites)
        .map(|index| {
            (0..num_sites)
                .map(|site| ((index >> (num_sites - 1 - site)) & 1) as u8)
                .collect()
        })
        .collect())
}

/// [`hilbert_configs`] as a `(2^n, n)` tensor.
pub fn generate_hilbert_space<B: Backend>(num_sites: usize, device: &B::Device) -> Result<Tensor<B, 2>, RbmError> {
    Ok(configs_to_tensor(&hilbert_configs(num_sites)?, num_sites, device))
}

/// Rotated log-probabilities of a mixed-basis batch, grouped by basis.
///
/// The output is ordered group by group (bases in sorted order, samples in
/// input order within a group), which is all a batch mean needs.
pub fn log_prob_by_basis<B: Backend, S: NeuralState<B>>(
    state: &S,
    samples: &[Vec<u8>],
    bases: &[Basis],
    unitaries: &Unitaries,
) -> Result<Tensor<B, 1>, RbmError> {
    if samples.len() != bases.len() {
        return Err(DataError::RowCountMismatch {
            samples: samples.len(),
            bases: bases.len(),
        }
        .into());
    }
    if samples.is_empty() {
        return Err(RbmError::InvalidConfig("empty sample batch".to_string()));
    }

    let mut groups: BTreeMap<&Basis, Vec<Vec<u8>>> = BTreeMap::new();
    for (sample, basis) in samples.iter().zip(bases) {
        groups.entry(basis).or_default().push(sample.clone());
    }
    let parts = groups
        .into_iter()
        .map(|(basis, group)| state.rotated_log_prob(&group, basis, unitaries))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Tensor::cat(parts, 0))
}

/// Gradient of `-mean log p_b(sigma)` over a batch with respect to every
/// parameter of `state`.
pub fn gradient<B, S>(
    state: &S,
    samples: &[Vec<u8>],
    bases: &[Basis],
    unitaries: &Unitaries,
) -> Result<GradientsParams, RbmError>
where
    B: AutodiffBackend,
    S: NeuralState<B> + AutodiffModule<B>,
{
    let loss = log_prob_by_basis(state, samples, bases, unitaries)?.mean().neg();
    Ok(GradientsParams::from_grads(loss.backward(), state))
}
