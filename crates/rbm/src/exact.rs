//! Exact host-side states over an enumerated Hilbert space and the
//! statistics computed against them: fidelity, rotated probabilities and
//! KL divergence.
//!
//! These are validation tools for small systems only: a mixed state on `n`
//! sites is stored as a dense `2^n x 2^n` matrix.

use measurements::{Basis, TargetState};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::RbmError;
use crate::unitaries::Unitaries;

/// Probabilities below this are clamped before taking logarithms.
const PROBABILITY_FLOOR: f64 = 1e-300;

/// A normalized state: a unit vector or a unit-trace density matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum ExactState {
    Pure(DVector<Complex64>),
    Mixed(DMatrix<Complex64>),
}

impl ExactState {
    /// Pure state from (possibly unnormalized) amplitudes.
    pub fn pure(amplitudes: Vec<Complex64>) -> Self {
        let v = DVector::from_vec(amplitudes);
        let norm = v.norm();
        Self::Pure(if norm > 0.0 { v.unscale(norm) } else { v })
    }

    /// Mixed state from a (possibly unnormalized) matrix; rescaled to unit trace.
    pub fn mixed(matrix: DMatrix<Complex64>) -> Self {
        let trace = matrix.trace().re;
        Self::Mixed(if trace > 0.0 { matrix.unscale(trace) } else { matrix })
    }

    pub fn from_target(target: &TargetState) -> Self {
        match target {
            TargetState::Pure(amplitudes) => Self::pure(amplitudes.clone()),
            TargetState::Mixed { dim, entries } => {
                Self::mixed(DMatrix::from_row_slice(*dim, *dim, entries))
            }
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Pure(v) => v.len(),
            Self::Mixed(m) => m.nrows(),
        }
    }

    pub fn num_sites(&self) -> usize {
        self.dim().trailing_zeros() as usize
    }

    /// `|psi><psi|` for pure states, the matrix itself otherwise.
    pub fn density_matrix(&self) -> DMatrix<Complex64> {
        match self {
            Self::Pure(v) => v * v.adjoint(),
            Self::Mixed(m) => m.clone(),
        }
    }

    /// Computational-basis outcome probabilities.
    pub fn probabilities(&self) -> Vec<f64> {
        match self {
            Self::Pure(v) => v.iter().map(|z| z.norm_sqr()).collect(),
            Self::Mixed(m) => m.diagonal().iter().map(|z| z.re).collect(),
        }
    }

    /// Outcome probabilities after applying `rotation` (`|U psi|^2` or
    /// `diag(U rho U^dagger)`).
    pub fn rotated_probabilities(&self, rotation: &DMatrix<Complex64>) -> Vec<f64> {
        match self {
            Self::Pure(v) => (rotation * v).iter().map(|z| z.norm_sqr()).collect(),
            Self::Mixed(m) => {
                let rotated = rotation * m * rotation.adjoint();
                rotated.diagonal().iter().map(|z| z.re).collect()
            }
        }
    }
}

/// Fidelity between two states.
///
/// Pure/pure: `|<t|psi>|^2`. Pure/mixed: `<t|rho|t>`. Mixed/mixed:
/// `(Tr sqrt(sqrt(sigma) rho sqrt(sigma)))^2`.
pub fn fidelity(target: &ExactState, model: &ExactState) -> f64 {
    match (target, model) {
        (ExactState::Pure(t), ExactState::Pure(psi)) => t.dotc(psi).norm_sqr(),
        (ExactState::Pure(t), ExactState::Mixed(rho)) | (ExactState::Mixed(rho), ExactState::Pure(t)) => {
            (t.adjoint() * rho * t)[(0, 0)].re
        }
        (ExactState::Mixed(sigma), ExactState::Mixed(rho)) => {
            let root = psd_sqrt(sigma);
            let inner = &root * rho * &root;
            let hermitian = (&inner + inner.adjoint()).unscale(2.0);
            let trace: f64 = hermitian
                .symmetric_eigen()
                .eigenvalues
                .iter()
                .map(|&l| l.max(0.0).sqrt())
                .sum();
            trace * trace
        }
    }
}

/// KL divergence `sum p log(p / q)` of the target from the model, averaged
/// over `bases`. An empty basis list means the computational basis only.
pub fn kl_divergence(
    target: &ExactState,
    model: &ExactState,
    bases: &[Basis],
    unitaries: &Unitaries,
) -> Result<f64, RbmError> {
    if target.dim() != model.dim() {
        return Err(RbmError::ShapeMismatch {
            expected: target.num_sites(),
            found: model.num_sites(),
        });
    }
    if bases.is_empty() {
        return Ok(relative_entropy(&target.probabilities(), &model.probabilities()));
    }

    let mut total = 0.0;
    for basis in bases {
        if basis.num_sites() != target.num_sites() {
            return Err(RbmError::ShapeMismatch {
                expected: target.num_sites(),
                found: basis.num_sites(),
            });
        }
        let rotation = unitaries.basis_matrix(basis)?;
        total += relative_entropy(
            &target.rotated_probabilities(&rotation),
            &model.rotated_probabilities(&rotation),
        );
    }
    Ok(total / bases.len() as f64)
}

fn relative_entropy(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|(&p, _)| p > 0.0)
        .map(|(&p, &q)| p * (p.ln() - q.max(PROBABILITY_FLOOR).ln()))
        .sum()
}

/// Square root of a Hermitian positive semi-definite matrix; negative
/// eigenvalues from round-off are clamped to zero.
fn psd_sqrt(m: &DMatrix<Complex64>) -> DMatrix<Complex64> {
    let eigen = m.clone().symmetric_eigen();
    let roots = DVector::from_iterator(
        eigen.eigenvalues.len(),
        eigen.eigenvalues.iter().map(|&l| Complex64::new(l.max(0.0).sqrt(), 0.0)),
    );
    &eigen.eigenvectors * DMatrix::from_diagonal(&roots) * eigen.eigenvectors.adjoint()
}
