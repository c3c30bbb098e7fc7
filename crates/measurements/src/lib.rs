//! Measurement data I/O for quantum state reconstruction.
//!
//! Provides the measurement basis and training set types shared by the
//! trainer and CLI, plus readers and writers for the whitespace-separated
//! text formats used for samples, basis assignments and exact targets.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::MeasurementReader;
pub use types::{Basis, DataError, DatasetSummary, TargetState, TrainingSet, COMPUTATIONAL_LABEL};
pub use writer::MeasurementWriter;
