//! Writes measurement shots and target states in the text formats read by
//! [`MeasurementReader`](crate::MeasurementReader).

use std::fmt::Write as _;
use std::path::Path;

use crate::types::{Basis, DataError, TargetState, TrainingSet};

/// Buffers measurement shots and writes them as a sample/basis file pair.
#[derive(Debug, Default)]
pub struct MeasurementWriter {
    samples: Vec<Vec<u8>>,
    bases: Vec<Basis>,
}

impl MeasurementWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a single shot.
    pub fn record(&mut self, sample: Vec<u8>, basis: Basis) {
        self.samples.push(sample);
        self.bases.push(basis);
    }

    /// Buffer every shot of a training set.
    pub fn record_all(&mut self, set: &TrainingSet) {
        self.samples.extend_from_slice(set.samples());
        self.bases.extend_from_slice(set.bases());
    }

    /// Number of buffered shots.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Validate the buffered shots and write both files.
    ///
    /// Bases are written one label per token (`X Z`).
    pub fn finish(self, samples_path: &Path, bases_path: &Path) -> Result<TrainingSet, DataError> {
        let set = TrainingSet::new(self.samples, self.bases)?;

        let mut samples_out = String::new();
        let mut bases_out = String::new();
        for (sample, basis) in set.samples().iter().zip(set.bases()) {
            let row: Vec<String> = sample.iter().map(u8::to_string).collect();
            samples_out.push_str(&row.join(" "));
            samples_out.push('\n');
            let labels: Vec<String> = basis.labels().map(String::from).collect();
            bases_out.push_str(&labels.join(" "));
            bases_out.push('\n');
        }
        write_file(samples_path, &samples_out)?;
        write_file(bases_path, &bases_out)?;

        tracing::info!(
            count = set.len(),
            samples = %samples_path.display(),
            bases = %bases_path.display(),
            "Wrote measurement shots"
        );
        Ok(set)
    }

    /// Write a basis list, one compact basis per line, skipping repeats.
    pub fn write_basis_list(path: &Path, bases: &[Basis]) -> Result<(), DataError> {
        let mut seen: Vec<&Basis> = Vec::new();
        let mut out = String::new();
        for basis in bases {
            if !seen.contains(&basis) {
                seen.push(basis);
                out.push_str(basis.as_str());
                out.push('\n');
            }
        }
        write_file(path, &out)
    }

    /// Write a pure target state as `re im` lines.
    pub fn write_target_psi(path: &Path, target: &TargetState) -> Result<(), DataError> {
        let TargetState::Pure(amplitudes) = target else {
            return Err(DataError::InvalidTarget(
                "only pure targets can be written as amplitude files".to_string(),
            ));
        };
        let mut out = String::new();
        for amp in amplitudes {
            // Infallible for String.
            let _ = writeln!(out, "{:e} {:e}", amp.re, amp.im);
        }
        write_file(path, &out)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), DataError> {
    let io_err = |source| DataError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)
}
