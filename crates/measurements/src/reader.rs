//! Reads measurement data from whitespace-separated text files.

use std::path::Path;

use num_complex::Complex64;

use crate::types::{Basis, DataError, TargetState, TrainingSet};

/// Static methods for reading measurement data files.
pub struct MeasurementReader;

impl MeasurementReader {
    /// Read a sample file: one shot per line, one 0/1 entry per site.
    pub fn read_samples(path: &Path) -> Result<Vec<Vec<u8>>, DataError> {
        let mut samples = Vec::new();
        for (line_no, line) in data_lines(path)? {
            let row = line
                .split_whitespace()
                .map(|token| match token {
                    "0" | "0.0" => Ok(0),
                    "1" | "1.0" => Ok(1),
                    other => Err(parse_error(
                        path,
                        line_no,
                        format!("expected 0 or 1, found {other:?}"),
                    )),
                })
                .collect::<Result<Vec<u8>, _>>()?;
            samples.push(row);
        }

        tracing::debug!(count = samples.len(), path = %path.display(), "Read samples");
        Ok(samples)
    }

    /// Read a basis file: one basis string per line.
    pub fn read_bases(path: &Path) -> Result<Vec<Basis>, DataError> {
        data_lines(path)?
            .into_iter()
            .map(|(line_no, line)| {
                Basis::parse(&line).map_err(|e| parse_error(path, line_no, e.to_string()))
            })
            .collect()
    }

    /// Read paired sample and basis files into a validated training set.
    pub fn read_training_set(samples: &Path, bases: &Path) -> Result<TrainingSet, DataError> {
        let set = TrainingSet::new(Self::read_samples(samples)?, Self::read_bases(bases)?)?;
        tracing::info!(
            samples = set.len(),
            sites = set.num_sites(),
            bases = set.unique_bases().len(),
            "Loaded training set"
        );
        Ok(set)
    }

    /// Read a list of bases used for evaluation, dropping duplicates while
    /// keeping first-seen order.
    pub fn read_basis_list(path: &Path) -> Result<Vec<Basis>, DataError> {
        let mut unique: Vec<Basis> = Vec::new();
        for basis in Self::read_bases(path)? {
            if !unique.contains(&basis) {
                unique.push(basis);
            }
        }
        Ok(unique)
    }

    /// Read a pure target state: `2^n` lines of `re im`.
    pub fn read_target_psi(path: &Path) -> Result<TargetState, DataError> {
        let amplitudes = data_lines(path)?
            .into_iter()
            .map(|(line_no, line)| {
                let values = parse_floats(path, line_no, &line)?;
                match values.as_slice() {
                    [re, im] => Ok(Complex64::new(*re, *im)),
                    [re] => Ok(Complex64::new(*re, 0.0)),
                    _ => Err(parse_error(path, line_no, "expected `re im`".to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        TargetState::pure(amplitudes)
    }

    /// Read a mixed target state from separate real and imaginary matrices.
    pub fn read_target_density(real: &Path, imag: &Path) -> Result<TargetState, DataError> {
        let re = read_matrix(real)?;
        let im = read_matrix(imag)?;
        let dim = re.len();
        if im.len() != dim || re.iter().chain(&im).any(|row| row.len() != dim) {
            return Err(DataError::InvalidTarget(format!(
                "density matrix parts in {} and {} are not both {dim}x{dim}",
                real.display(),
                imag.display()
            )));
        }
        let entries = re
            .iter()
            .flatten()
            .zip(im.iter().flatten())
            .map(|(&r, &i)| Complex64::new(r, i))
            .collect();
        TargetState::mixed(dim, entries)
    }
}

fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>, DataError> {
    data_lines(path)?
        .into_iter()
        .map(|(line_no, line)| parse_floats(path, line_no, &line))
        .collect()
}

/// Non-empty, non-comment lines with 1-based line numbers.
fn data_lines(path: &Path) -> Result<Vec<(usize, String)>, DataError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| (i, line.to_string()))
        .collect())
}

fn parse_floats(path: &Path, line_no: usize, line: &str) -> Result<Vec<f64>, DataError> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|e| parse_error(path, line_no, format!("{token:?}: {e}")))
        })
        .collect()
}

fn parse_error(path: &Path, line: usize, message: String) -> DataError {
    DataError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    }
}
