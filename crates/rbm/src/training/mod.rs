//! Contrastive-divergence trainer, tempered negative-phase chains, epoch
//! callbacks and training metrics.

pub mod callbacks;
pub mod metrics;
pub mod tempering;
pub mod trainer;

pub use callbacks::{
    Callback, CallbackList, ChangeCriterion, EarlyStopping, LambdaCallback, MetricEvaluator, ModelSaver, Signal,
    SnapshotMeta, Timer, VarianceBasedEarlyStopping,
};
pub use metrics::{MetricContext, MetricHistory, MetricRecord, MetricValue};
pub use tempering::{inverse_temperatures, TemperedChains};
pub use trainer::{fit, FitConfig, FitOutcome, LrSchedule, OBJECTIVE_METRIC};
