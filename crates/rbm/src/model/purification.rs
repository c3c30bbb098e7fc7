//! RBM with an extra layer of auxiliary units, used to purify mixed states.
//!
//! ```text
//! E(v, h, x) = -v^T W h - v^T U x - a^T v - b^T h - d^T x
//! ```
//!
//! The hidden units `h` model the pure-state part, the auxiliary units `x`
//! the environment that is traced out. The auxiliary bias `d` is optional:
//! the phase machine of a density matrix never uses it.

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use rand::Rng;

use crate::model::energy::EnergyModel;
use crate::model::functional::{bernoulli, random_normal, softplus};
use crate::model::rbm::scaled_param;

/// Configuration for a purification RBM.
#[derive(Config, Debug)]
pub struct PurificationRbmConfig {
    pub num_visible: usize,
    pub num_hidden: usize,
    pub num_aux: usize,
    /// Weights are drawn from `N(0, (init_scale / sqrt(num_visible))^2)`.
    #[config(default = 1.0)]
    pub init_scale: f64,
    /// Whether the auxiliary units carry a bias.
    #[config(default = true)]
    pub aux_bias: bool,
}

impl PurificationRbmConfig {
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> PurificationRbm<B> {
        let mut rbm = PurificationRbm {
            weights: Param::from_tensor(Tensor::zeros([self.num_visible, self.num_hidden], device)),
            mixing_weights: Param::from_tensor(Tensor::zeros([self.num_visible, self.num_aux], device)),
            visible_bias: Param::from_tensor(Tensor::zeros([self.num_visible], device)),
            hidden_bias: Param::from_tensor(Tensor::zeros([self.num_hidden], device)),
            aux_bias: self
                .aux_bias
                .then(|| Param::from_tensor(Tensor::zeros([self.num_aux], device))),
        };
        rbm.initialize_parameters(self.init_scale, rng);
        rbm
    }
}

/// Purification RBM: visible, hidden and auxiliary layers.
#[derive(Module, Debug)]
pub struct PurificationRbm<B: Backend> {
    /// Visible-hidden couplings, `(num_visible, num_hidden)`.
    pub(crate) weights: Param<Tensor<B, 2>>,
    /// Visible-auxiliary couplings, `(num_visible, num_aux)`.
    pub(crate) mixing_weights: Param<Tensor<B, 2>>,
    pub(crate) visible_bias: Param<Tensor<B, 1>>,
    pub(crate) hidden_bias: Param<Tensor<B, 1>>,
    pub(crate) aux_bias: Option<Param<Tensor<B, 1>>>,
}

/// Closed-form gradient of the batch-summed effective energy.
#[derive(Debug, Clone)]
pub struct PurificationGradient<B: Backend> {
    pub weights: Tensor<B, 2>,
    pub mixing_weights: Tensor<B, 2>,
    pub visible_bias: Tensor<B, 1>,
    pub hidden_bias: Tensor<B, 1>,
    pub aux_bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> PurificationRbm<B> {
    /// Copy at inverse temperature `beta`: every parameter, the auxiliary
    /// layer included, is scaled by `beta`. Detached from the autodiff graph.
    pub fn tempered(&self, beta: f64) -> Self {
        Self {
            weights: scaled_param(&self.weights, beta),
            mixing_weights: scaled_param(&self.mixing_weights, beta),
            visible_bias: scaled_param(&self.visible_bias, beta),
            hidden_bias: scaled_param(&self.hidden_bias, beta),
            aux_bias: self.aux_bias.as_ref().map(|d| scaled_param(d, beta)),
        }
    }

    /// Re-draw both weight matrices and zero every bias.
    pub fn initialize_parameters<R: Rng + ?Sized>(&mut self, scale: f64, rng: &mut R) {
        let [nv, nh] = self.weights.val().dims();
        let na = self.num_aux();
        let device = self.device();
        let std = scale / (nv.max(1) as f64).sqrt();
        self.weights = Param::from_tensor(random_normal([nv, nh], std, rng, &device));
        self.mixing_weights = Param::from_tensor(random_normal([nv, na], std, rng, &device));
        self.visible_bias = Param::from_tensor(Tensor::zeros([nv], &device));
        self.hidden_bias = Param::from_tensor(Tensor::zeros([nh], &device));
        if self.aux_bias.is_some() {
            self.aux_bias = Some(Param::from_tensor(Tensor::zeros([na], &device)));
        }
    }

    pub fn num_hidden(&self) -> usize {
        self.weights.val().dims()[1]
    }

    pub fn num_aux(&self) -> usize {
        self.mixing_weights.val().dims()[1]
    }

    pub fn has_aux_bias(&self) -> bool {
        self.aux_bias.is_some()
    }

    pub fn device(&self) -> B::Device {
        self.weights.val().device()
    }

    pub fn weights(&self) -> Tensor<B, 2> {
        self.weights.val()
    }

    pub fn mixing_weights(&self) -> Tensor<B, 2> {
        self.mixing_weights.val()
    }

    pub fn visible_bias(&self) -> Tensor<B, 1> {
        self.visible_bias.val()
    }

    pub fn hidden_bias(&self) -> Tensor<B, 1> {
        self.hidden_bias.val()
    }

    pub fn aux_bias(&self) -> Option<Tensor<B, 1>> {
        self.aux_bias.as_ref().map(|bias| bias.val())
    }

    /// `b + v W`, shape `(batch, num_hidden)`.
    pub fn hidden_preactivation(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        v.matmul(self.weights.val()) + self.hidden_bias.val().unsqueeze_dim::<2>(0)
    }

    /// `v U`, without the auxiliary bias.
    pub fn mixing_linear(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        v.matmul(self.mixing_weights.val())
    }

    /// `d + v U` (or `v U` without an auxiliary bias).
    pub fn aux_preactivation(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        self.with_aux_bias(self.mixing_linear(v))
    }

    /// Add the auxiliary bias, if any, to a `(batch, num_aux)` tensor.
    pub fn with_aux_bias(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.aux_bias {
            Some(bias) => x + bias.val().unsqueeze_dim::<2>(0),
            None => x,
        }
    }

    /// `a + h W^T + x U^T`, shape `(batch, num_visible)`.
    pub fn visible_preactivation(&self, h: Tensor<B, 2>, aux: Tensor<B, 2>) -> Tensor<B, 2> {
        h.matmul(self.weights.val().transpose())
            + aux.matmul(self.mixing_weights.val().transpose())
            + self.visible_bias.val().unsqueeze_dim::<2>(0)
    }

    pub fn prob_h_given_v(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.hidden_preactivation(v))
    }

    pub fn prob_aux_given_v(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.aux_preactivation(v))
    }

    pub fn prob_v_given_h(&self, h: Tensor<B, 2>, aux: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.visible_preactivation(h, aux))
    }

    pub fn sample_h_given_v<R: Rng + ?Sized>(&self, v: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        bernoulli(self.prob_h_given_v(v), rng)
    }

    pub fn sample_aux_given_v<R: Rng + ?Sized>(&self, v: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        bernoulli(self.prob_aux_given_v(v), rng)
    }

    pub fn sample_v_given_h<R: Rng + ?Sized>(
        &self,
        h: Tensor<B, 2>,
        aux: Tensor<B, 2>,
        rng: &mut R,
    ) -> Tensor<B, 2> {
        bernoulli(self.prob_v_given_h(h, aux), rng)
    }

    /// `a . v + sum softplus(b + v W)`: the effective energy before the
    /// auxiliary units are traced out.
    pub fn visible_hidden_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let visible = v
            .clone()
            .matmul(self.visible_bias.val().unsqueeze_dim::<2>(1))
            .squeeze::<1>(1);
        let hidden = softplus(self.hidden_preactivation(v)).sum_dim(1).squeeze::<1>(1);
        visible + hidden
    }

    /// `Gamma^(+/-)(v, v') = (f(v) +/- f(v')) / 2` with
    /// `f` = [`visible_hidden_energy`](Self::visible_hidden_energy).
    pub fn gamma(&self, v: Tensor<B, 2>, vp: Tensor<B, 2>, plus: bool) -> Tensor<B, 1> {
        let left = self.visible_hidden_energy(v);
        let right = self.visible_hidden_energy(vp);
        let combined = if plus { left + right } else { left - right };
        combined.mul_scalar(0.5)
    }

    /// Closed-form gradient of `sum_batch effective_energy(v)`.
    pub fn effective_energy_gradient(&self, v: Tensor<B, 2>) -> PurificationGradient<B> {
        let p_h = self.prob_h_given_v(v.clone());
        let p_aux = self.prob_aux_given_v(v.clone());
        let v_t = v.clone().transpose();
        PurificationGradient {
            weights: v_t.clone().matmul(p_h.clone()),
            mixing_weights: v_t.matmul(p_aux.clone()),
            visible_bias: v.sum_dim(0).squeeze::<1>(0),
            hidden_bias: p_h.sum_dim(0).squeeze::<1>(0),
            aux_bias: self
                .aux_bias
                .as_ref()
                .map(|_| p_aux.sum_dim(0).squeeze::<1>(0)),
        }
    }
}

impl<B: Backend> EnergyModel<B> for PurificationRbm<B> {
    fn num_visible(&self) -> usize {
        self.weights.val().dims()[0]
    }

    /// Effective energy with both hidden and auxiliary units summed out.
    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let aux = softplus(self.aux_preactivation(v.clone())).sum_dim(1).squeeze::<1>(1);
        self.visible_hidden_energy(v) + aux
    }

    fn gibbs_steps<R: Rng + ?Sized>(&self, k: usize, v0: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        let mut v = v0.detach();
        for _ in 0..k {
            let h = self.sample_h_given_v(v.clone(), rng);
            let aux = self.sample_aux_given_v(v, rng);
            v = self.sample_v_given_h(h, aux, rng);
        }
        v
    }
}
