//! Synthetic targets and measurement data for tests and demos.

use measurements::{Basis, TargetState, TrainingSet, COMPUTATIONAL_LABEL};
use num_complex::Complex64;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::RbmError;
use crate::exact::ExactState;
use crate::state::HILBERT_SPACE_MAX_SITES;
use crate::unitaries::Unitaries;

fn check_sites(num_sites: usize) -> Result<(), RbmError> {
    if num_sites == 0 {
        return Err(RbmError::InvalidConfig("target state needs at least one site".to_string()));
    }
    if num_sites > HILBERT_SPACE_MAX_SITES {
        return Err(RbmError::HilbertSpaceTooLarge {
            num_sites,
            limit: HILBERT_SPACE_MAX_SITES,
        });
    }
    Ok(())
}

/// `(|10..0> + |01..0> + ... + |00..1>) / sqrt(n)`.
pub fn w_state(num_sites: usize) -> Result<TargetState, RbmError> {
    check_sites(num_sites)?;
    let dim = 1usize << num_sites;
    let amp = 1.0 / (num_sites as f64).sqrt();
    let amplitudes = (0..dim)
        .map(|i| Complex64::new(if i.count_ones() == 1 { amp } else { 0.0 }, 0.0))
        .collect();
    Ok(TargetState::pure(amplitudes)?)
}

/// `(|0..0> + |1..1>) / sqrt(2)`.
pub fn ghz(num_sites: usize) -> Result<TargetState, RbmError> {
    check_sites(num_sites)?;
    let dim = 1usize << num_sites;
    let amp = std::f64::consts::FRAC_1_SQRT_2;
    let mut amplitudes = vec![Complex64::new(0.0, 0.0); dim];
    amplitudes[0] = Complex64::new(amp, 0.0);
    amplitudes[dim - 1] = Complex64::new(amp, 0.0);
    Ok(TargetState::pure(amplitudes)?)
}

/// The computational basis followed by every `{X, Y}` pair on each pair of
/// neighbouring sites.
pub fn adjacent_pair_bases(num_sites: usize) -> Vec<Basis> {
    let mut bases = vec![Basis::computational(num_sites)];
    for site in 0..num_sites.saturating_sub(1) {
        for first in ['X', 'Y'] {
            for second in ['X', 'Y'] {
                let labels: String = (0..num_sites)
                    .map(|j| {
                        if j == site {
                            first
                        } else if j == site + 1 {
                            second
                        } else {
                            COMPUTATIONAL_LABEL
                        }
                    })
                    .collect();
                if let Ok(basis) = Basis::parse(&labels) {
                    bases.push(basis);
                }
            }
        }
    }
    bases
}

/// Draw `shots_per_basis` measurement outcomes of `target` in each basis.
pub fn sample_measurements<R: Rng + ?Sized>(
    target: &ExactState,
    bases: &[Basis],
    shots_per_basis: usize,
    unitaries: &Unitaries,
    rng: &mut R,
) -> Result<TrainingSet, RbmError> {
    let n = target.num_sites();
    let mut samples = Vec::with_capacity(bases.len() * shots_per_basis);
    let mut labels = Vec::with_capacity(bases.len() * shots_per_basis);
    for basis in bases {
        if basis.num_sites() != n {
            return Err(RbmError::ShapeMismatch {
                expected: n,
                found: basis.num_sites(),
            });
        }
        let probs: Vec<f64> = target
            .rotated_probabilities(&unitaries.basis_matrix(basis)?)
            .into_iter()
            .map(|p| p.max(0.0))
            .collect();
        let dist = WeightedIndex::new(&probs)
            .map_err(|e| RbmError::InvalidConfig(format!("cannot sample basis {basis}: {e}")))?;
        for _ in 0..shots_per_basis {
            let index = dist.sample(rng);
            samples.push((0..n).map(|j| ((index >> (n - 1 - j)) & 1) as u8).collect());
            labels.push(basis.clone());
        }
    }
    tracing::debug!(shots = samples.len(), bases = bases.len(), "Sampled synthetic measurements");
    Ok(TrainingSet::new(samples, labels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_w_and_ghz_are_normalized() {
        for target in [w_state(4).unwrap(), ghz(4).unwrap()] {
            let state = ExactState::from_target(&target);
            let total: f64 = state.probabilities().iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
        let probs = ExactState::from_target(&w_state(3).unwrap()).probabilities();
        assert!((probs[0b001] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(probs[0b011], 0.0);
        assert!(w_state(0).is_err());
    }

    #[test]
    fn test_adjacent_pair_bases() {
        let bases = adjacent_pair_bases(3);
        assert_eq!(bases.len(), 1 + 2 * 4);
        assert!(bases[0].is_computational());
        assert_eq!(bases[1].as_str(), "XXZ");
        assert_eq!(bases[8].as_str(), "ZYY");
    }

    #[test]
    fn test_sampled_frequencies_follow_rotated_distribution() {
        let unitaries = Unitaries::standard();
        let target = ExactState::from_target(&w_state(2).unwrap());
        let bases = [Basis::parse("ZZ").unwrap(), Basis::parse("XX").unwrap()];
        let mut rng = StdRng::seed_from_u64(7);
        let data = sample_measurements(&target, &bases, 4000, &unitaries, &mut rng).unwrap();
        assert_eq!(data.len(), 8000);

        // W state: ZZ gives only 01/10; XX gives only 00/11.
        for (sample, basis) in data.samples().iter().zip(data.bases()) {
            if basis.is_computational() {
                assert_ne!(sample[0], sample[1]);
            } else {
                assert_eq!(sample[0], sample[1]);
            }
        }
        let ones = data.samples()[..4000].iter().filter(|s| s[0] == 1).count();
        assert!((ones as f64 / 4000.0 - 0.5).abs() < 0.03);
    }
}
