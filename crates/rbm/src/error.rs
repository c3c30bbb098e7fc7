use measurements::DataError;

/// Errors raised by energy models, NN-states and the trainer.
#[derive(Debug, thiserror::Error)]
pub enum RbmError {
    /// Input width does not match the number of visible units.
    #[error("expected {expected} visible units, got {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A basis label in the data has no registered rotation.
    #[error("no unitary registered for basis label {0:?}")]
    MissingUnitary(char),

    /// A registered matrix fails the unitarity check.
    #[error("matrix for basis label {label:?} is not unitary (deviation {deviation:.3e})")]
    NotUnitary { label: char, deviation: f64 },

    /// A sample rotates more sites than the configured expansion limit.
    #[error("sample rotates {sites} sites, limit is {limit}")]
    TooManyRotatedSites { sites: usize, limit: usize },

    /// Exhaustive enumeration requested for too many sites.
    #[error("refusing to enumerate 2^{num_sites} configurations (limit 2^{limit})")]
    HilbertSpaceTooLarge { num_sites: usize, limit: usize },

    /// Training configuration is unusable.
    #[error("invalid fit configuration: {0}")]
    InvalidConfig(String),

    /// Training objective became NaN or infinite.
    #[error("non-finite training objective at epoch {epoch}, batch {batch}")]
    NonFinite { epoch: usize, batch: usize },

    #[error(transparent)]
    Data(#[from] DataError),
}
