//! Complex tensor algebra on pairs of real burn tensors.
//!
//! burn has no complex dtype, so complex quantities are carried as a
//! `(re, im)` pair. [`PolarTensor`] keeps a log-modulus next to a unit phase
//! factor so that amplitudes spanning many orders of magnitude can be
//! combined without overflow.

use burn::prelude::*;
use num_complex::Complex64;

use crate::model::bridge::{tensor_to_vec, values_to_tensor};

/// Complex tensor stored as separate real and imaginary parts.
#[derive(Debug, Clone)]
pub struct ComplexTensor<B: Backend, const D: usize> {
    pub re: Tensor<B, D>,
    pub im: Tensor<B, D>,
}

impl<B: Backend, const D: usize> ComplexTensor<B, D> {
    pub fn new(re: Tensor<B, D>, im: Tensor<B, D>) -> Self {
        Self { re, im }
    }

    /// Purely real tensor.
    pub fn from_real(re: Tensor<B, D>) -> Self {
        let im = re.zeros_like();
        Self { re, im }
    }

    /// Unit-modulus values `exp(i * phase)`.
    pub fn from_phase(phase: Tensor<B, D>) -> Self {
        Self {
            re: phase.clone().cos(),
            im: phase.sin(),
        }
    }

    /// `modulus * exp(i * phase)`.
    pub fn from_polar(modulus: Tensor<B, D>, phase: Tensor<B, D>) -> Self {
        Self::from_phase(phase).scale(modulus)
    }

    pub fn dims(&self) -> [usize; D] {
        self.re.dims()
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }

    /// Elementwise complex product.
    pub fn mul(self, other: Self) -> Self {
        let re = self.re.clone() * other.re.clone() - self.im.clone() * other.im.clone();
        let im = self.re * other.im + self.im * other.re;
        Self::new(re, im)
    }

    pub fn conj(self) -> Self {
        Self::new(self.re, self.im.neg())
    }

    /// Multiply by a real tensor of the same shape.
    pub fn scale(self, factor: Tensor<B, D>) -> Self {
        Self::new(self.re * factor.clone(), self.im * factor)
    }

    pub fn mul_scalar(self, factor: f64) -> Self {
        Self::new(self.re.mul_scalar(factor), self.im.mul_scalar(factor))
    }

    /// `|z|^2` elementwise.
    pub fn norm_sqr(self) -> Tensor<B, D> {
        self.re.powf_scalar(2.0) + self.im.powf_scalar(2.0)
    }

    /// `|z|` elementwise.
    pub fn abs(self) -> Tensor<B, D> {
        self.norm_sqr().sqrt()
    }

    pub fn sum_dim(self, dim: usize) -> Self {
        Self::new(self.re.sum_dim(dim), self.im.sum_dim(dim))
    }

    pub fn reshape<const D2: usize>(self, dims: [usize; D2]) -> ComplexTensor<B, D2> {
        ComplexTensor::new(self.re.reshape(dims), self.im.reshape(dims))
    }

    pub fn detach(self) -> Self {
        Self::new(self.re.detach(), self.im.detach())
    }

    /// Host copy of all entries, row-major.
    pub fn to_host(self) -> Vec<Complex64> {
        tensor_to_vec(self.re)
            .into_iter()
            .zip(tensor_to_vec(self.im))
            .map(|(re, im)| Complex64::new(re, im))
            .collect()
    }

    /// Upload row-major host values.
    pub fn from_host(values: &[Complex64], dims: [usize; D], device: &B::Device) -> Self {
        let re = values.iter().map(|z| z.re).collect();
        let im = values.iter().map(|z| z.im).collect();
        Self::new(
            values_to_tensor(re, dims, device),
            values_to_tensor(im, dims, device),
        )
    }
}

impl<B: Backend> ComplexTensor<B, 2> {
    /// Complex matrix product.
    pub fn matmul(self, other: Self) -> Self {
        let re = self.re.clone().matmul(other.re.clone()) - self.im.clone().matmul(other.im.clone());
        let im = self.re.matmul(other.im) + self.im.matmul(other.re);
        Self::new(re, im)
    }

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        Self::new(self.re.transpose(), self.im.transpose().neg())
    }
}

impl<B: Backend> ComplexTensor<B, 1> {
    /// Inner product `<self|other> = sum(conj(self) * other)` as a
    /// one-element tensor.
    pub fn inner(self, other: Self) -> ComplexTensor<B, 1> {
        let prod = self.conj().mul(other);
        ComplexTensor::new(prod.re.sum(), prod.im.sum())
    }

    /// Outer product `|self><other|`.
    pub fn outer(self, other: Self) -> ComplexTensor<B, 2> {
        let n = self.re.dims()[0];
        let m = other.re.dims()[0];
        let left = ComplexTensor::new(self.re.reshape([n, 1]), self.im.reshape([n, 1]));
        let right = other.conj();
        let right = ComplexTensor::new(right.re.reshape([1, m]), right.im.reshape([1, m]));
        left.matmul(right)
    }
}

/// Complex values held as `exp(log_modulus) * unit`, with `|unit| = 1`.
#[derive(Debug, Clone)]
pub struct PolarTensor<B: Backend, const D: usize> {
    pub log_modulus: Tensor<B, D>,
    pub unit: ComplexTensor<B, D>,
}

impl<B: Backend, const D: usize> PolarTensor<B, D> {
    /// `exp(log_modulus + i * phase)`.
    pub fn from_log_phase(log_modulus: Tensor<B, D>, phase: Tensor<B, D>) -> Self {
        Self {
            log_modulus,
            unit: ComplexTensor::from_phase(phase),
        }
    }

    /// Materialize the complex values. May overflow for large moduli.
    pub fn to_complex(self) -> ComplexTensor<B, D> {
        self.unit.scale(self.log_modulus.exp())
    }

    pub fn reshape<const D2: usize>(self, dims: [usize; D2]) -> PolarTensor<B, D2> {
        PolarTensor {
            log_modulus: self.log_modulus.reshape(dims),
            unit: self.unit.reshape(dims),
        }
    }
}

impl<B: Backend> PolarTensor<B, 1> {
    /// Host values rescaled so the largest modulus is 1.
    pub fn to_host_rescaled(self) -> Vec<Complex64> {
        let log_modulus = tensor_to_vec(self.log_modulus);
        let shift = log_modulus.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        log_modulus
            .into_iter()
            .zip(self.unit.to_host())
            .map(|(lm, u)| u * (lm - shift).exp())
            .collect()
    }
}
