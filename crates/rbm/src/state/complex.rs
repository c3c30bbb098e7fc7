//! Complex wavefunction with separate amplitude and phase machines:
//! `psi(v) = exp(E_am(v) / 2 + i E_ph(v) / 2)`.

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
pub struct ComplexWavefunctionConfig {
    pub num_visible: usize,
    /// Hidden units of each machine.
    pub num_hidden: usize,
    #[config(default = 1.0)]
    pub init_scale: f64,
}

impl ComplexWavefunctionConfig {
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> ComplexWavefunction<B> {
        let rbm_config = BinaryRbmConfig::new(self.num_visible, self.num_hidden).with_init_scale(self.init_scale);
        let rbm_am = rbm_config.init(rng, device);
        let rbm_ph = rbm_config.init(rng, device);
        ComplexWavefunction {
            rbm_am,
            rbm_ph,
            init_scale: self.init_scale,
        }
    }
}

#[derive(Module, Debug)]
pub struct ComplexWavefunction<B: Backend> {
    pub(crate) rbm_am: BinaryRbm<B>,
    pub(crate) rbm_ph: BinaryRbm<B>,
    init_scale: f64,
}

impl<B: Backend> ComplexWavefunction<B> {
    /// # Panics
    /// Panics if the machines have different visible counts.
    pub fn from_rbms(rbm_am: BinaryRbm<B>, rbm_ph: BinaryRbm<B>) -> Self {
        assert_eq!(rbm_am.num_visible(), rbm_ph.num_visible(), "machines must share visible units");
        Self {
            rbm_am,
            rbm_ph,
            init_scale: 1.0,
        }
    }

    pub fn rbm_am(&self) -> &BinaryRbm<B> {
        &self.rbm_am
    }

    pub fn rbm_ph(&self) -> &BinaryRbm<B> {
        &self.rbm_ph
    }
}

impl<B: Backend> NeuralState<B> for ComplexWavefunction<B> {
    type Config = ComplexWavefunctionConfig;

    fn kind(&self) -> StateKind {
        StateKind::Complex
    }

    fn config(&self) -> Self::Config {
        ComplexWavefunctionConfig::new(self.rbm_am.num_visible(), self.rbm_am.num_hidden())
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

    /// Samples follow `|psi|^2`, so only the amplitude machine is involved.
    fn tempered(&self, beta: f64) -> Self {
        Self {
            rbm_am: self.rbm_am.tempered(beta),
            rbm_ph: self.rbm_ph.clone(),
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

impl<B: Backend> Wavefunction<B> for ComplexWavefunction<B> {
    fn log_psi(&self, v: Tensor<B, 2>) -> PolarTensor<B, 1> {
        let log_modulus = self.effective_energy(v.clone()).mul_scalar(0.5);
        PolarTensor::from_log_phase(log_modulus, self.phase(v))
    }

    fn phase(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        self.rbm_ph.effective_energy(v).mul_scalar(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::{configs_to_tensor, tensor_to_f64, tensor_to_vec};
    use crate::state::{generate_hilbert_space, hilbert_configs};
    use burn::backend::NdArray;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f64>;

    fn test_state(seed: u64) -> ComplexWavefunction<TestBackend> {
        let mut rng = StdRng::seed_from_u64(seed);
        ComplexWavefunctionConfig::new(3, 3)
            .with_init_scale(2.0)
            .init(&mut rng, &Default::default())
    }

    #[test]
    fn test_psi_combines_amplitude_and_phase() {
        let device = Default::default();
        let state = test_state(1);
        let v = configs_to_tensor::<TestBackend>(&[vec![1, 0, 1], vec![0, 1, 1]], 3, &device);
        let psi = state.psi(v.clone()).to_host();
        let amplitudes = tensor_to_vec(state.amplitude(v.clone()));
        let phases = tensor_to_vec(state.phase(v));
        for ((z, a), p) in psi.iter().zip(&amplitudes).zip(&phases) {
            let expected = Complex64::from_polar(*a, *p);
            assert!((z - expected).norm() < 1e-10);
        }
    }

    #[test]
    fn test_log_rho_is_hermitian_outer_product() {
        let device = Default::default();
        let state = test_state(2);
        let configs = hilbert_configs(3).unwrap();
        let psi = state.psi(configs_to_tensor(&configs, 3, &device)).to_host();

        let rows: Vec<Vec<u8>> = configs.iter().flat_map(|c| std::iter::repeat(c.clone()).take(8)).collect();
        let cols: Vec<Vec<u8>> = (0..8).flat_map(|_| configs.clone()).collect();
        let rho = state
            .log_rho(configs_to_tensor(&rows, 3, &device), configs_to_tensor(&cols, 3, &device))
            .to_complex()
            .to_host();
        for i in 0..8 {
            for j in 0..8 {
                let expected = psi[i] * psi[j].conj();
                assert!((rho[i * 8 + j] - expected).norm() < 1e-9 * expected.norm().max(1.0));
                assert!((rho[i * 8 + j] - rho[j * 8 + i].conj()).norm() < 1e-9 * expected.norm().max(1.0));
            }
        }
    }

    #[test]
    fn test_rotated_log_prob_matches_exact_rotation() {
        let device = Default::default();
        let unitaries = Unitaries::standard();
        let state = test_state(3);
        let space = generate_hilbert_space::<TestBackend>(3, &device).unwrap();
        let exact = state.exact_state(space.clone());
        let log_norm = tensor_to_f64(state.log_normalization(space));

        let configs = hilbert_configs(3).unwrap();
        for basis in ["YZZ", "XYZ", "YYX"] {
            let basis = Basis::parse(basis).unwrap();
            let expected = exact.rotated_probabilities(&unitaries.basis_matrix(&basis).unwrap());
            let log_probs = tensor_to_vec(state.rotated_log_prob(&configs, &basis, &unitaries).unwrap());
            let total: f64 = log_probs.iter().map(|lp| (lp - log_norm).exp()).sum();
            assert!((total - 1.0).abs() < 1e-10, "{basis}: probabilities sum to {total}");
            for (lp, p) in log_probs.iter().zip(&expected) {
                assert!(((lp - log_norm).exp() - p).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_phase_machine_does_not_affect_sampling_distribution() {
        let device = Default::default();
        let state = test_state(4);
        let space = generate_hilbert_space::<TestBackend>(3, &device).unwrap();
        let probs = state.exact_state(space.clone()).probabilities();
        let energies = tensor_to_vec(state.rbm_am.effective_energy(space));
        let z: f64 = energies.iter().map(|e| e.exp()).sum();
        for (p, e) in probs.iter().zip(&energies) {
            assert!((p - e.exp() / z).abs() < 1e-10);
        }
    }

    #[test]
    fn test_tempered_copy_keeps_phase() {
        let device = Default::default();
        let state = test_state(5);
        let space = generate_hilbert_space::<TestBackend>(3, &device).unwrap();
        let hot = state.tempered(0.0);
        let flat = tensor_to_vec(hot.effective_energy(space.clone()));
        assert!(flat.iter().all(|e| (e - 3.0 * 2f64.ln()).abs() < 1e-12));
        let phases = tensor_to_vec(state.phase(space.clone()));
        let hot_phases = tensor_to_vec(hot.phase(space));
        assert_eq!(phases, hot_phases);
        assert_eq!(hot.config().init_scale, 2.0);
    }
}
