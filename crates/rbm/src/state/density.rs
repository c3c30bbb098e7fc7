//! Density matrix from a pair of purification RBMs.
//!
//! ```text
//! rho(v, v') = exp(Gamma+_am(v, v') + i Gamma-_ph(v, v')) * prod_k (1 + exp(x_k + i y_k))
//! x = ((v + v') U_am) / 2 + d_am
//! y = ((v - v') U_ph) / 2
//! ```
//!
//! The auxiliary layer is traced out analytically. The phase machine has
//! no auxiliary bias.

use burn::prelude::*;
use measurements::Basis;
use nalgebra::DMatrix;
use rand::Rng;

use crate::error::RbmError;
use crate::exact::ExactState;
use crate::model::bridge::{configs_to_tensor, tensor_to_configs};
use crate::model::cplx::{ComplexTensor, PolarTensor};
use crate::model::energy::EnergyModel;
use crate::model::purification::{PurificationRbm, PurificationRbmConfig};
use crate::state::rotation::density_log_prob;
use crate::state::{NeuralState, StateKind};
use crate::unitaries::Unitaries;

#[derive(Config, Debug)]
pub struct DensityMatrixConfig {
    pub num_visible: usize,
    pub num_hidden: usize,
    pub num_aux: usize,
    #[config(default = 1.0)]
    pub init_scale: f64,
}

impl DensityMatrixConfig {
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> DensityMatrix<B> {
        let rbm_config = PurificationRbmConfig::new(self.num_visible, self.num_hidden, self.num_aux)
            .with_init_scale(self.init_scale);
        let rbm_am = rbm_config.init(rng, device);
        let rbm_ph = rbm_config.clone().with_aux_bias(false).init(rng, device);
        DensityMatrix {
            rbm_am,
            rbm_ph,
            init_scale: self.init_scale,
        }
    }
}

#[derive(Module, Debug)]
pub struct DensityMatrix<B: Backend> {
    pub(crate) rbm_am: PurificationRbm<B>,
    pub(crate) rbm_ph: PurificationRbm<B>,
    init_scale: f64,
}

impl<B: Backend> DensityMatrix<B> {
    pub fn rbm_am(&self) -> &PurificationRbm<B> {
        &self.rbm_am
    }

    pub fn rbm_ph(&self) -> &PurificationRbm<B> {
        &self.rbm_ph
    }

    pub fn num_aux(&self) -> usize {
        self.rbm_am.num_aux()
    }

    /// Unnormalized matrix elements `rho(v, v')`, row by row.
    pub fn rho(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>) -> ComplexTensor<B, 1> {
        self.log_rho(v, vp).to_complex()
    }

    /// `sum_k log(1 + exp(x_k + i y_k))` in polar form.
    pub fn mixing_term(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>) -> PolarTensor<B, 1> {
        let [batch, _] = v.dims();
        let x = self
            .rbm_am
            .with_aux_bias(self.rbm_am.mixing_linear(v.clone() + vp.clone()).mul_scalar(0.5));
        let y = self.rbm_ph.mixing_linear(v - vp).mul_scalar(0.5);

        // 1 + e^(x + iy) scaled by e^(-max(x, 0)).
        let x_pos = x.clone().clamp_min(0.0);
        let damped = (x - x_pos.clone()).exp();
        let re = x_pos.clone().neg().exp() + damped.clone() * y.clone().cos();
        let im = damped * y.sin();
        let modulus_sq = re.clone().powf_scalar(2.0) + im.clone().powf_scalar(2.0);
        let log_modulus = (x_pos + modulus_sq.clone().log().mul_scalar(0.5))
            .sum_dim(1)
            .squeeze::<1>(1);

        let modulus = modulus_sq.sqrt();
        let re = re / modulus.clone();
        let im = im / modulus;
        let mut unit = ComplexTensor::from_real(Tensor::<B, 2>::ones([batch, 1], &self.device()));
        for k in 0..self.num_aux() {
            let factor = ComplexTensor::new(
                re.clone().slice([0..batch, k..k + 1]),
                im.clone().slice([0..batch, k..k + 1]),
            );
            unit = unit.mul(factor);
        }
        PolarTensor {
            log_modulus,
            unit: unit.reshape([batch]),
        }
    }
}

impl<B: Backend> NeuralState<B> for DensityMatrix<B> {
    type Config = DensityMatrixConfig;

    fn kind(&self) -> StateKind {
        StateKind::Density
    }

    fn config(&self) -> Self::Config {
        DensityMatrixConfig::new(self.rbm_am.num_visible(), self.rbm_am.num_hidden(), self.rbm_am.num_aux())
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

    /// `log rho(v, v)`: the amplitude machine with hidden and auxiliary
    /// units traced out.
    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        self.rbm_am.effective_energy(v)
    }

    fn log_rho(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>) -> PolarTensor<B, 1> {
        let gamma_plus = self.rbm_am.gamma(v.clone(), vp.clone(), true);
        let gamma_minus = self.rbm_ph.gamma(v.clone(), vp.clone(), false);
        let mixing = self.mixing_term(v, vp);
        PolarTensor {
            log_modulus: gamma_plus + mixing.log_modulus,
            unit: ComplexTensor::from_phase(gamma_minus).mul(mixing.unit),
        }
    }

    fn rotated_log_prob(
        &self,
        samples: &[Vec<u8>],
        basis: &Basis,
        unitaries: &Unitaries,
    ) -> Result<Tensor<B, 1>, RbmError> {
        density_log_prob(self, samples, basis, unitaries)
    }

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
        let [dim, num_sites] = space.dims();
        let configs = tensor_to_configs(space);
        let mut rows = Vec::with_capacity(dim * dim);
        let mut cols = Vec::with_capacity(dim * dim);
        for row in &configs {
            for col in &configs {
                rows.push(row.clone());
                cols.push(col.clone());
            }
        }
        let device = self.device();
        let entries = self
            .log_rho(
                configs_to_tensor(&rows, num_sites, &device),
                configs_to_tensor(&cols, num_sites, &device),
            )
            .to_host_rescaled();
        ExactState::mixed(DMatrix::from_row_slice(dim, dim, &entries))
    }
}
