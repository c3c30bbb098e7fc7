//! Quantum state reconstruction with restricted Boltzmann machines.
//!
//! Wavefunctions (positive or complex) and density matrices are represented
//! by RBM energy models and trained by contrastive divergence on projective
//! measurements taken in arbitrary local bases. Exact statistics over the
//! enumerated Hilbert space (fidelity, KL divergence) track progress on
//! small systems.

pub mod error;
pub mod exact;
pub mod model;
pub mod observables;
pub mod state;
pub mod synthetic;
pub mod training;
pub mod unitaries;

pub use error::RbmError;
pub use exact::ExactState;
pub use observables::{Observable, ObservableStats};
pub use state::{
    ComplexWavefunction, ComplexWavefunctionConfig, DensityMatrix, DensityMatrixConfig, NeuralState,
    PositiveWavefunction, PositiveWavefunctionConfig, StateKind, Wavefunction,
};
pub use training::{fit, FitConfig, FitOutcome, MetricHistory};
pub use unitaries::{Unitaries, Unitary};
