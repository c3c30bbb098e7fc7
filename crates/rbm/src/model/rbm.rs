use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use rand::Rng;

use crate::model::energy::EnergyModel;
use crate::model::functional::{bernoulli, random_normal, softplus};

/// Configuration for a binary-binary restricted Boltzmann machine.
///
/// ```text
/// E(v, h) = -v^T W h - a^T v - b^T h
/// W: (num_visible, num_hidden), a: (num_visible,), b: (num_hidden,)
/// ```
#[derive(Config, Debug)]
pub struct BinaryRbmConfig {
    /// Number of visible units (lattice sites).
    pub num_visible: usize,
    /// Number of hidden units.
    pub num_hidden: usize,
    /// Weights are drawn from `N(0, (init_scale / sqrt(num_visible))^2)`.
    #[config(default = 1.0)]
    pub init_scale: f64,
}

impl BinaryRbmConfig {
    /// Initialize an RBM, drawing weights from `rng`.
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> BinaryRbm<B> {
        let mut rbm = BinaryRbm {
            weights: Param::from_tensor(Tensor::zeros([self.num_visible, self.num_hidden], device)),
            visible_bias: Param::from_tensor(Tensor::zeros([self.num_visible], device)),
            hidden_bias: Param::from_tensor(Tensor::zeros([self.num_hidden], device)),
        };
        rbm.initialize_parameters(self.init_scale, rng);
        rbm
    }
}

/// Binary-binary RBM with visible and hidden biases.
#[derive(Module, Debug)]
pub struct BinaryRbm<B: Backend> {
    /// Visible-hidden couplings, `(num_visible, num_hidden)`.
    pub(crate) weights: Param<Tensor<B, 2>>,
    pub(crate) visible_bias: Param<Tensor<B, 1>>,
    pub(crate) hidden_bias: Param<Tensor<B, 1>>,
}

/// Closed-form gradient of the batch-summed effective energy.
#[derive(Debug, Clone)]
pub struct RbmGradient<B: Backend> {
    pub weights: Tensor<B, 2>,
    pub visible_bias: Tensor<B, 1>,
    pub hidden_bias: Tensor<B, 1>,
}

impl<B: Backend> BinaryRbm<B> {
    /// Build an RBM from explicit parameter tensors.
    ///
    /// # Panics
    /// Panics if the bias lengths do not match the weight matrix.
    pub fn from_tensors(weights: Tensor<B, 2>, visible_bias: Tensor<B, 1>, hidden_bias: Tensor<B, 1>) -> Self {
        let [nv, nh] = weights.dims();
        assert_eq!(visible_bias.dims(), [nv], "visible bias length");
        assert_eq!(hidden_bias.dims(), [nh], "hidden bias length");
        Self {
            weights: Param::from_tensor(weights),
            visible_bias: Param::from_tensor(visible_bias),
            hidden_bias: Param::from_tensor(hidden_bias),
        }
    }

    /// Re-draw the weights from `N(0, (scale / sqrt(num_visible))^2)` and
    /// zero both biases. Deterministic for a given RNG state.
    pub fn initialize_parameters<R: Rng + ?Sized>(&mut self, scale: f64, rng: &mut R) {
        let weights = self.weights.val();
        let [nv, nh] = weights.dims();
        let device = weights.device();
        let std = scale / (nv.max(1) as f64).sqrt();
        self.weights = Param::from_tensor(random_normal([nv, nh], std, rng, &device));
        self.visible_bias = Param::from_tensor(Tensor::zeros([nv], &device));
        self.hidden_bias = Param::from_tensor(Tensor::zeros([nh], &device));
    }

    /// Copy with every parameter scaled by `beta`, i.e. the Boltzmann
    /// distribution at inverse temperature `beta`. `beta = 0` is uniform.
    /// The copy is detached from the autodiff graph.
    pub fn tempered(&self, beta: f64) -> Self {
        Self {
            weights: scaled_param(&self.weights, beta),
            visible_bias: scaled_param(&self.visible_bias, beta),
            hidden_bias: scaled_param(&self.hidden_bias, beta),
        }
    }

    pub fn num_hidden(&self) -> usize {
        self.weights.val().dims()[1]
    }

    pub fn device(&self) -> B::Device {
        self.weights.val().device()
    }

    pub fn weights(&self) -> Tensor<B, 2> {
        self.weights.val()
    }

    pub fn visible_bias(&self) -> Tensor<B, 1> {
        self.visible_bias.val()
    }

    pub fn hidden_bias(&self) -> Tensor<B, 1> {
        self.hidden_bias.val()
    }

    /// `b + v W`, shape `(batch, num_hidden)`.
    pub fn hidden_preactivation(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        v.matmul(self.weights.val()) + self.hidden_bias.val().unsqueeze_dim::<2>(0)
    }

    /// `a + h W^T`, shape `(batch, num_visible)`.
    pub fn visible_preactivation(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        h.matmul(self.weights.val().transpose()) + self.visible_bias.val().unsqueeze_dim::<2>(0)
    }

    /// `a . v` per row, shape `(batch,)`.
    pub fn visible_term(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        v.matmul(self.visible_bias.val().unsqueeze_dim::<2>(1)).squeeze::<1>(1)
    }

    pub fn prob_h_given_v(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.hidden_preactivation(v))
    }

    pub fn prob_v_given_h(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.visible_preactivation(h))
    }

    pub fn sample_h_given_v<R: Rng + ?Sized>(&self, v: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        bernoulli(self.prob_h_given_v(v), rng)
    }

    pub fn sample_v_given_h<R: Rng + ?Sized>(&self, h: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        bernoulli(self.prob_v_given_h(h), rng)
    }

    /// Closed-form gradient of `sum_batch effective_energy(v)`:
    /// `dW = v^T p(h|v)`, `da = sum v`, `db = sum p(h|v)`.
    pub fn effective_energy_gradient(&self, v: Tensor<B, 2>) -> RbmGradient<B> {
        let p_h = self.prob_h_given_v(v.clone());
        RbmGradient {
            weights: v.clone().transpose().matmul(p_h.clone()),
            visible_bias: v.sum_dim(0).squeeze::<1>(0),
            hidden_bias: p_h.sum_dim(0).squeeze::<1>(0),
        }
    }
}

/// Fresh leaf parameter holding `beta * param`.
pub(crate) fn scaled_param<B: Backend, const D: usize>(param: &Param<Tensor<B, D>>, beta: f64) -> Param<Tensor<B, D>> {
    Param::from_tensor(param.val().detach().mul_scalar(beta))
}

impl<B: Backend> EnergyModel<B> for BinaryRbm<B> {
    fn num_visible(&self) -> usize {
        self.weights.val().dims()[0]
    }

    fn effective_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let hidden = softplus(self.hidden_preactivation(v.clone())).sum_dim(1).squeeze::<1>(1);
        self.visible_term(v) + hidden
    }

    fn gibbs_steps<R: Rng + ?Sized>(&self, k: usize, v0: Tensor<B, 2>, rng: &mut R) -> Tensor<B, 2> {
        let mut v = v0.detach();
        for _ in 0..k {
            let h = self.sample_h_given_v(v, rng);
            v = self.sample_v_given_h(h, rng);
        }
        v
    }
}
