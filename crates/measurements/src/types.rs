//! Core types for projective measurement data: bases, training sets and
//! exact target states.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Label of the computational (Pauli-Z) basis. Sites carrying any other
/// label were measured after a local rotation.
pub const COMPUTATIONAL_LABEL: char = 'Z';

/// Errors raised while loading or validating measurement data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Underlying file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of a data file could not be parsed.
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A sample entry is not 0 or 1.
    #[error("sample {row} has non-binary value {value} at site {site}")]
    NonBinary { row: usize, site: usize, value: u8 },

    /// A sample row has a different number of sites than the first row.
    #[error("sample {row} has {found} sites, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A basis string does not cover every site of its sample.
    #[error("basis for sample {row} has {found} sites, expected {expected}")]
    BasisLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Samples and basis assignments disagree on the number of rows.
    #[error("{samples} samples but {bases} basis assignments")]
    RowCountMismatch { samples: usize, bases: usize },

    /// A basis string contains something other than single-letter labels.
    #[error("invalid basis {0:?}: labels must be single ASCII letters")]
    InvalidBasis(String),

    /// Target state has an impossible shape.
    #[error("invalid target state: {0}")]
    InvalidTarget(String),

    /// No samples were supplied.
    #[error("training set is empty")]
    Empty,
}

/// Measurement basis of one shot: one single-character label per site,
/// most significant site first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Basis(String);

impl Basis {
    /// Parse a basis written either compactly (`"XZZ"`) or with one label
    /// per whitespace-separated token (`"X Z Z"`). Labels are upper-cased.
    pub fn parse(s: &str) -> Result<Self, DataError> {
        let trimmed = s.trim();
        let labels: String = if trimmed.contains(char::is_whitespace) {
            let mut out = String::new();
            for token in trimmed.split_whitespace() {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => out.push(c),
                    _ => return Err(DataError::InvalidBasis(s.to_string())),
                }
            }
            out
        } else {
            trimmed.to_string()
        };

        if labels.is_empty() || !labels.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DataError::InvalidBasis(s.to_string()));
        }
        Ok(Self(labels.to_ascii_uppercase()))
    }

    /// The all-Z basis on `num_sites` sites.
    pub fn computational(num_sites: usize) -> Self {
        Self(std::iter::repeat(COMPUTATIONAL_LABEL).take(num_sites).collect())
    }

    pub fn num_sites(&self) -> usize {
        self.0.len()
    }

    /// Per-site labels in site order.
    pub fn labels(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }

    /// Label of a single site.
    pub fn label(&self, site: usize) -> Option<char> {
        self.0.as_bytes().get(site).map(|&b| b as char)
    }

    /// Whether every site is measured in the computational basis.
    pub fn is_computational(&self) -> bool {
        self.labels().all(|c| c == COMPUTATIONAL_LABEL)
    }

    /// Indices of sites measured in a rotated basis.
    pub fn rotated_sites(&self) -> Vec<usize> {
        self.labels()
            .enumerate()
            .filter(|(_, c)| *c != COMPUTATIONAL_LABEL)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Basis {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Basis::parse(&value)
    }
}

impl From<Basis> for String {
    fn from(basis: Basis) -> Self {
        basis.0
    }
}

/// Ordered measurement shots with the basis each shot was taken in.
///
/// Every shot carries uniform empirical weight. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    samples: Vec<Vec<u8>>,
    bases: Vec<Basis>,
    num_sites: usize,
}

impl TrainingSet {
    /// Build a training set, validating shapes and values.
    pub fn new(samples: Vec<Vec<u8>>, bases: Vec<Basis>) -> Result<Self, DataError> {
        if samples.len() != bases.len() {
            return Err(DataError::RowCountMismatch {
                samples: samples.len(),
                bases: bases.len(),
            });
        }
        let num_sites = samples.first().map(Vec::len).ok_or(DataError::Empty)?;

        for (row, (sample, basis)) in samples.iter().zip(&bases).enumerate() {
            if sample.len() != num_sites {
                return Err(DataError::RaggedRow {
                    row,
                    expected: num_sites,
                    found: sample.len(),
                });
            }
            if basis.num_sites() != num_sites {
                return Err(DataError::BasisLength {
                    row,
                    expected: num_sites,
                    found: basis.num_sites(),
                });
            }
            if let Some((site, &value)) = sample.iter().enumerate().find(|(_, &v)| v > 1) {
                return Err(DataError::NonBinary { row, site, value });
            }
        }

        Ok(Self {
            samples,
            bases,
            num_sites,
        })
    }

    /// Training set where every shot was taken in the computational basis.
    pub fn computational(samples: Vec<Vec<u8>>) -> Result<Self, DataError> {
        let num_sites = samples.first().map(Vec::len).ok_or(DataError::Empty)?;
        let bases = vec![Basis::computational(num_sites); samples.len()];
        Self::new(samples, bases)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn samples(&self) -> &[Vec<u8>] {
        &self.samples
    }

    pub fn bases(&self) -> &[Basis] {
        &self.bases
    }

    /// Copy out the shots at `indices`, preserving order.
    pub fn select(&self, indices: &[usize]) -> (Vec<Vec<u8>>, Vec<Basis>) {
        indices
            .iter()
            .map(|&i| (self.samples[i].clone(), self.bases[i].clone()))
            .unzip()
    }

    /// Indices of shots measured entirely in the computational basis.
    pub fn computational_indices(&self) -> Vec<usize> {
        self.bases
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_computational())
            .map(|(i, _)| i)
            .collect()
    }

    /// Distinct bases in sorted order.
    pub fn unique_bases(&self) -> Vec<Basis> {
        let mut unique: Vec<Basis> = self.bases.clone();
        unique.sort();
        unique.dedup();
        unique
    }

    /// Shot counts and basis histogram.
    pub fn summary(&self) -> DatasetSummary {
        let mut basis_counts = BTreeMap::new();
        for basis in &self.bases {
            *basis_counts.entry(basis.to_string()).or_insert(0) += 1;
        }
        DatasetSummary {
            num_samples: self.len(),
            num_sites: self.num_sites,
            computational_samples: self.computational_indices().len(),
            basis_counts,
        }
    }
}

/// Summary statistics over a training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub num_samples: usize,
    pub num_sites: usize,
    pub computational_samples: usize,
    pub basis_counts: BTreeMap<String, usize>,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} shots on {} sites ({} computational)",
            self.num_samples, self.num_sites, self.computational_samples
        )?;
        for (basis, count) in &self.basis_counts {
            writeln!(f, "  {basis:<12} {count}")?;
        }
        Ok(())
    }
}

/// Exactly known state used to validate reconstructions.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetState {
    /// Amplitudes over the computational basis (length `2^n`).
    Pure(Vec<Complex64>),
    /// Row-major `dim x dim` density matrix.
    Mixed { dim: usize, entries: Vec<Complex64> },
}

impl TargetState {
    /// Build a pure target, checking the length is a power of two.
    pub fn pure(amplitudes: Vec<Complex64>) -> Result<Self, DataError> {
        check_dimension(amplitudes.len())?;
        Ok(Self::Pure(amplitudes))
    }

    /// Build a mixed target from row-major entries.
    pub fn mixed(dim: usize, entries: Vec<Complex64>) -> Result<Self, DataError> {
        check_dimension(dim)?;
        if entries.len() != dim * dim {
            return Err(DataError::InvalidTarget(format!(
                "{} entries for a {dim}x{dim} matrix",
                entries.len()
            )));
        }
        Ok(Self::Mixed { dim, entries })
    }

    /// Hilbert space dimension `2^n`.
    pub fn dim(&self) -> usize {
        match self {
            Self::Pure(amplitudes) => amplitudes.len(),
            Self::Mixed { dim, .. } => *dim,
        }
    }

    pub fn num_sites(&self) -> usize {
        self.dim().trailing_zeros() as usize
    }
}

fn check_dimension(dim: usize) -> Result<(), DataError> {
    if dim < 2 || !dim.is_power_of_two() {
        return Err(DataError::InvalidTarget(format!(
            "dimension {dim} is not a power of two >= 2"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_parse_compact_and_spaced() {
        let compact = Basis::parse("xzY").unwrap();
        let spaced = Basis::parse(" X Z  Y ").unwrap();
        assert_eq!(compact, spaced);
        assert_eq!(compact.as_str(), "XZY");
        assert_eq!(compact.rotated_sites(), vec![0, 2]);
        assert_eq!(compact.label(1), Some('Z'));
        assert!(!compact.is_computational());
    }

    #[test]
    fn test_basis_parse_rejects_garbage() {
        assert!(Basis::parse("").is_err());
        assert!(Basis::parse("X1").is_err());
        assert!(Basis::parse("XX Z").is_err());
    }

    #[test]
    fn test_basis_serde_roundtrip() {
        let basis = Basis::parse("XZ").unwrap();
        let json = serde_json::to_string(&basis).unwrap();
        assert_eq!(json, "\"XZ\"");
        let back: Basis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, basis);
        assert!(serde_json::from_str::<Basis>("\"X?\"").is_err());
    }

    #[test]
    fn test_training_set_row_mismatch_is_fatal() {
        let err = TrainingSet::new(vec![vec![0, 1], vec![1, 0]], vec![Basis::computational(2)])
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::RowCountMismatch { samples: 2, bases: 1 }
        ));
    }

    #[test]
    fn test_training_set_rejects_bad_rows() {
        let bases = vec![Basis::computational(2); 2];
        let ragged = TrainingSet::new(vec![vec![0, 1], vec![1]], bases.clone()).unwrap_err();
        assert!(matches!(ragged, DataError::RaggedRow { row: 1, .. }));

        let non_binary = TrainingSet::new(vec![vec![0, 1], vec![2, 0]], bases).unwrap_err();
        assert!(matches!(
            non_binary,
            DataError::NonBinary { row: 1, site: 0, value: 2 }
        ));

        let short_basis = TrainingSet::new(vec![vec![0, 1]], vec![Basis::computational(3)])
            .unwrap_err();
        assert!(matches!(short_basis, DataError::BasisLength { .. }));

        assert!(matches!(
            TrainingSet::new(vec![], vec![]).unwrap_err(),
            DataError::Empty
        ));
    }

    #[test]
    fn test_training_set_summary() {
        let set = TrainingSet::new(
            vec![vec![0, 1], vec![1, 0], vec![1, 1]],
            vec![
                Basis::parse("ZZ").unwrap(),
                Basis::parse("XX").unwrap(),
                Basis::parse("ZZ").unwrap(),
            ],
        )
        .unwrap();

        assert_eq!(set.computational_indices(), vec![0, 2]);
        assert_eq!(set.unique_bases().len(), 2);

        let summary = set.summary();
        assert_eq!(summary.num_samples, 3);
        assert_eq!(summary.computational_samples, 2);
        assert_eq!(summary.basis_counts["XX"], 1);
        assert_eq!(summary.basis_counts["ZZ"], 2);

        let (samples, bases) = set.select(&[2, 1]);
        assert_eq!(samples, vec![vec![1, 1], vec![1, 0]]);
        assert_eq!(bases[1].as_str(), "XX");
    }

    #[test]
    fn test_target_state_dimensions() {
        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        let target = TargetState::pure(vec![zero, one, zero, zero]).unwrap();
        assert_eq!(target.num_sites(), 2);

        assert!(TargetState::pure(vec![one; 3]).is_err());
        assert!(TargetState::mixed(2, vec![one; 3]).is_err());
        assert_eq!(TargetState::mixed(2, vec![one; 4]).unwrap().num_sites(), 1);
    }
}
