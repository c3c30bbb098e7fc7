//! Positive wavefunction: `psi(v) = exp(E_am(v) / 2)` from a single RBM.

use burn::prelude::*;
use measurements::Basis;
use rand::Rng;

use crate::error::RbmError;
use crate::exact::ExactState;
use crate::model::cplx::PolarTensor;
use crate::model::energy::EnergyModel;
use crate::model::rbm::{BinaryRbm, BinaryRbmConfig};
use crate::state::rotation::wavefunction_log_prob;
use crate::state::{wavefunction_exact_state, wavefunction_log_rho, NeuralState, StateKind, Wavefunction};
use crate::unitaries::Unitaries;

#[derive(Config, Debug)]
pub struct PositiveWavefunctionConfig {
    pub num_visible: usize,
    pub num_hidden: usize,
    #[config(default = 1.0)]
    pub init_scale: f64,
}

impl PositiveWavefunctionConfig {
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> PositiveWavefunction<B> {
        let rbm_am = BinaryRbmConfig::new(self.num_visible, self.num_hidden)
            .with_init_scale(self.init_scale)
            .init(rng, device);
        PositiveWavefunction {
            rbm_am,
            init_scale: self.init_scale,
        }
    }
}

#[derive(Module, Debug)]
pub struct PositiveWavefunction<B: Backend> {
    pub(crate) rbm_am: BinaryRbm<B>,
    /// Scale the weights were drawn with, kept for [`NeuralState::config`].
    init_scale: f64,
}

impl<B: Backend> PositiveWavefunction<B> {
    pub fn from_rbm(rbm_am: BinaryRbm<B>) -> Self {
        Self { rbm_am, init_scale: 1.0 }
    }

    pub fn rbm_am(&self) -> &BinaryRbm<B> {
        &self.rbm_am
    }
}

impl<B: Backend> NeuralState<B> for PositiveWavefunction<B> {
    type Config = PositiveWavefunctionConfig;

    fn kind(&self) -> StateKind {
        StateKind::Positive
    }

    fn config(&self) -> Self::Config {
        PositiveWavefunctionConfig::new(self.rbm_am.num_visible(), self.rbm_am.num_hidden())
            .with_init_scale(self.init_scale)
    }

    fn from_config<R: Rng + ?Sized>(config: &Self::Config, rng: &mut R, device: &B::Device) -> Self {
        config.init(rng, device)
    }

    fn num_visible(&self) -> usize {
        self.rbm_am.num_visible()
    }

    fn device(&self) -> B::Device {
        self.rbm_am.device()
    }

    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        self.rbm_am.effective_energy(v)
    }

    fn log_rho(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>) -> PolarTensor<B, 1> {
        wavefunction_log_rho(self, v, vp)
    }

    fn rotated_log_prob(
        &self,
        samples: &[Vec<u8>],
        basis: &Basis,
        unitaries: &Unitaries,
    ) -> Result<Tensor<B, 1>, RbmError> {
        wavefunction_log_prob(self, samples, basis, unitaries)
    }

    fn tempered(&self, beta: f64) -> Self {
        Self {
            rbm_am: self.rbm_am.tempered(beta),
            init_scale: self.init_scale,
        }
    }

    fn gibbs_sample<R: Rng + ?Sized>(&self, k: usize, v0: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        self.rbm_am.gibbs_steps(k, v0, rng)
    }

    fn exact_state(&self, space: Tensor<B, 2>) -> ExactState {
        wavefunction_exact_state(self, space)
    }
}

impl<B: Backend> Wavefunction<B> for PositiveWavefunction<B> {
    fn log_psi(&self, v: Tensor<B, 2>) -> PolarTensor<B, 1> {
        let log_modulus = self.effective_energy(v).mul_scalar(0.5);
        let phase = log_modulus.zeros_like();
        PolarTensor::from_log_phase(log_modulus, phase)
    }

    fn phase(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = v.dims();
        Tensor::zeros([batch], &v.device())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::{configs_to_tensor, tensor_to_f64, tensor_to_vec};
    use crate::state::{generate_hilbert_space, hilbert_configs};
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f64>;

    fn test_state(seed: u64) -> PositiveWavefunction<TestBackend> {
        let mut rng = StdRng::seed_from_u64(seed);
        PositiveWavefunctionConfig::new(3, 4)
            .with_init_scale(2.0)
            .init(&mut rng, &Default::default())
    }

    #[test]
    fn test_amplitude_squared_is_unnormalized_probability() {
        let device = Default::default();
        let state = test_state(1);
        let space = generate_hilbert_space::<TestBackend>(3, &device).unwrap();
        let amplitudes = tensor_to_vec(state.amplitude(space.clone()));
        let energies = tensor_to_vec(state.effective_energy(space.clone()));
        for (a, e) in amplitudes.iter().zip(&energies) {
            assert!((a * a - e.exp()).abs() < 1e-10 * e.exp().max(1.0));
        }
        assert!(tensor_to_vec(state.phase(space.clone())).iter().all(|&p| p == 0.0));

        let total: f64 = energies.iter().map(|e| e.exp()).sum();
        assert!((state.compute_normalization(space) - total).abs() < 1e-10 * total);
    }

    #[test]
    fn test_rotated_log_prob_matches_exact_rotation() {
        let device = Default::default();
        let unitaries = Unitaries::standard();
        let state = test_state(2);
        let space = generate_hilbert_space::<TestBackend>(3, &device).unwrap();
        let exact = state.exact_state(space.clone());
        let log_norm = tensor_to_f64(state.log_normalization(space));

        let configs = hilbert_configs(3).unwrap();
        for basis in ["XZZ", "ZYX", "XXX"] {
            let basis = Basis::parse(basis).unwrap();
            let expected = exact.rotated_probabilities(&unitaries.basis_matrix(&basis).unwrap());
            let log_probs = tensor_to_vec(state.rotated_log_prob(&configs, &basis, &unitaries).unwrap());
            for (lp, p) in log_probs.iter().zip(&expected) {
                assert!(((lp - log_norm).exp() - p).abs() < 1e-10, "{basis}: {} vs {p}", (lp - log_norm).exp());
            }
        }
    }

    #[test]
    fn test_computational_shortcut_matches_effective_energy() {
        let device = Default::default();
        let state = test_state(3);
        let samples = vec![vec![1, 0, 1], vec![0, 0, 1]];
        let rotated = state
            .rotated_log_prob(&samples, &Basis::computational(3), &Unitaries::standard())
            .unwrap();
        let direct = state.effective_energy(configs_to_tensor(&samples, 3, &device));
        assert_eq!(tensor_to_vec(rotated), tensor_to_vec(direct));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let state = test_state(4);
        let err = state
            .rotated_log_prob(&[vec![1, 0]], &Basis::parse("XZ").unwrap(), &Unitaries::standard())
            .unwrap_err();
        assert!(matches!(err, RbmError::ShapeMismatch { expected: 3, found: 2 }));
    }
}
