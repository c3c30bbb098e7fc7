//! Registry of single-site basis rotations keyed by basis label.
//!
//! A measurement in basis `b` on a site is modelled as applying the 2x2
//! unitary registered for `b` before a computational-basis readout. The
//! computational label `Z` maps to the identity.

use std::collections::BTreeMap;

use measurements::{Basis, COMPUTATIONAL_LABEL};
use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::RbmError;

/// Default cap on rotated sites per sample. A wavefunction sample with `r`
/// rotated sites expands into `2^r` terms, a density matrix sample into `4^r`.
pub const DEFAULT_MAX_ROTATED_SITES: usize = 8;

const UNITARITY_TOLERANCE: f64 = 1e-10;

/// A 2x2 complex matrix, row-major: `entries[row][col]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unitary {
    pub entries: [[Complex64; 2]; 2],
}

impl Unitary {
    pub fn new(entries: [[Complex64; 2]; 2]) -> Self {
        Self { entries }
    }

    pub fn identity() -> Self {
        let (one, zero) = (Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        Self::new([[one, zero], [zero, one]])
    }

    /// Rotation for Pauli-X measurements (Hadamard).
    pub fn pauli_x() -> Self {
        let h = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        Self::new([[h, h], [h, -h]])
    }

    /// Rotation for Pauli-Y measurements.
    pub fn pauli_y() -> Self {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        Self::new([
            [Complex64::new(h, 0.0), Complex64::new(0.0, -h)],
            [Complex64::new(h, 0.0), Complex64::new(0.0, h)],
        ])
    }

    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.entries[row][col]
    }

    /// Largest entry of `|U U^dagger - I|`.
    pub fn unitarity_deviation(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..2 {
            for j in 0..2 {
                let dot: Complex64 = (0..2).map(|k| self.entries[i][k] * self.entries[j][k].conj()).sum();
                let target = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((dot - target).norm());
            }
        }
        worst
    }

    pub fn to_matrix(&self) -> DMatrix<Complex64> {
        DMatrix::from_fn(2, 2, |i, j| self.entries[i][j])
    }
}

/// Basis label to rotation map, plus the rotated-site limit applied when
/// expanding samples.
#[derive(Debug, Clone)]
pub struct Unitaries {
    map: BTreeMap<char, Unitary>,
    max_rotated_sites: usize,
}

impl Default for Unitaries {
    fn default() -> Self {
        Self::standard()
    }
}

impl Unitaries {
    /// Registry with the Pauli X, Y and Z measurement rotations.
    pub fn standard() -> Self {
        let map = BTreeMap::from([
            ('X', Unitary::pauli_x()),
            ('Y', Unitary::pauli_y()),
            (COMPUTATIONAL_LABEL, Unitary::identity()),
        ]);
        Self {
            map,
            max_rotated_sites: DEFAULT_MAX_ROTATED_SITES,
        }
    }

    pub fn with_max_rotated_sites(mut self, limit: usize) -> Self {
        self.max_rotated_sites = limit;
        self
    }

    pub fn max_rotated_sites(&self) -> usize {
        self.max_rotated_sites
    }

    /// Register (or replace) the rotation for `label`.
    ///
    /// The computational label cannot be remapped.
    pub fn register(&mut self, label: char, unitary: Unitary) -> Result<(), RbmError> {
        let label = label.to_ascii_uppercase();
        let deviation = unitary.unitarity_deviation();
        if deviation > UNITARITY_TOLERANCE {
            return Err(RbmError::NotUnitary { label, deviation });
        }
        if label == COMPUTATIONAL_LABEL && unitary != Unitary::identity() {
            return Err(RbmError::InvalidConfig(format!(
                "basis label {COMPUTATIONAL_LABEL:?} is reserved for the identity"
            )));
        }
        self.map.insert(label, unitary);
        Ok(())
    }

    pub fn get(&self, label: char) -> Result<&Unitary, RbmError> {
        self.map.get(&label).ok_or(RbmError::MissingUnitary(label))
    }

    pub fn labels(&self) -> impl Iterator<Item = char> + '_ {
        self.map.keys().copied()
    }

    /// Check that every label of every basis has a registered rotation.
    pub fn validate_bases<'a>(&self, bases: impl IntoIterator<Item = &'a Basis>) -> Result<(), RbmError> {
        for basis in bases {
            for label in basis.labels() {
                self.get(label)?;
            }
        }
        Ok(())
    }

    /// Rotations of the rotated sites of `basis`, with the site-count limit
    /// enforced.
    pub fn rotated_sites(&self, basis: &Basis) -> Result<Vec<(usize, Unitary)>, RbmError> {
        let sites = basis.rotated_sites();
        if sites.len() > self.max_rotated_sites {
            return Err(RbmError::TooManyRotatedSites {
                sites: sites.len(),
                limit: self.max_rotated_sites,
            });
        }
        sites
            .into_iter()
            .map(|site| {
                let label = basis.label(site).unwrap_or(COMPUTATIONAL_LABEL);
                self.get(label).map(|u| (site, *u))
            })
            .collect()
    }

    /// Full `2^n x 2^n` rotation `U_0 (x) U_1 (x) ... (x) U_{n-1}`, most
    /// significant site first.
    pub fn basis_matrix(&self, basis: &Basis) -> Result<DMatrix<Complex64>, RbmError> {
        let mut matrix = DMatrix::from_element(1, 1, Complex64::new(1.0, 0.0));
        for label in basis.labels() {
            matrix = matrix.kronecker(&self.get(label)?.to_matrix());
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rotations_are_unitary() {
        let unitaries = Unitaries::standard();
        for label in ['X', 'Y', 'Z'] {
            assert!(unitaries.get(label).unwrap().unitarity_deviation() < 1e-12);
        }
        assert_eq!(unitaries.labels().collect::<String>(), "XYZ");
    }

    #[test]
    fn test_register_rejects_non_unitary() {
        let mut unitaries = Unitaries::standard();
        let one = Complex64::new(1.0, 0.0);
        let err = unitaries.register('A', Unitary::new([[one, one], [one, one]])).unwrap_err();
        assert!(matches!(err, RbmError::NotUnitary { label: 'A', .. }));

        let err = unitaries.register('Z', Unitary::pauli_x()).unwrap_err();
        assert!(matches!(err, RbmError::InvalidConfig(_)));

        unitaries.register('H', Unitary::pauli_x()).unwrap();
        assert!(unitaries.get('H').is_ok());
    }

    #[test]
    fn test_missing_label_is_reported() {
        let unitaries = Unitaries::standard();
        let bases = [Basis::parse("XZ").unwrap(), Basis::parse("ZQ").unwrap()];
        let err = unitaries.validate_bases(&bases).unwrap_err();
        assert!(matches!(err, RbmError::MissingUnitary('Q')));
    }

    #[test]
    fn test_rotated_site_limit() {
        let unitaries = Unitaries::standard().with_max_rotated_sites(2);
        assert_eq!(unitaries.rotated_sites(&Basis::parse("XZY").unwrap()).unwrap().len(), 2);
        let err = unitaries.rotated_sites(&Basis::parse("XXX").unwrap()).unwrap_err();
        assert!(matches!(err, RbmError::TooManyRotatedSites { sites: 3, limit: 2 }));
    }

    #[test]
    fn test_basis_matrix_is_kronecker_product() {
        let unitaries = Unitaries::standard();
        let m = unitaries.basis_matrix(&Basis::parse("XZ").unwrap()).unwrap();
        assert_eq!(m.shape(), (4, 4));
        let h = std::f64::consts::FRAC_1_SQRT_2;
        // Row |10>, column |00>: U_X[1][0] * I[0][0].
        assert!((m[(2, 0)] - Complex64::new(h, 0.0)).norm() < 1e-12);
        // Row |11>, column |11>: U_X[1][1] * I[1][1].
        assert!((m[(3, 3)] - Complex64::new(-h, 0.0)).norm() < 1e-12);
        // Off-diagonal in the Z site vanishes.
        assert!(m[(1, 0)].norm() < 1e-12);
    }
}
