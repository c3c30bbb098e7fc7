//! Observer hooks invoked by the trainer at batch and epoch boundaries.
//!
//! Hooks receive the NN-state by shared reference only. The epoch-end hook
//! also gets the run's [`MetricHistory`]: evaluators append to it, stopping
//! criteria read it. Callbacks run in registration order, so an evaluator
//! must be added before anything that reads its metric. Any error aborts
//! training.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::RbmError;
use crate::observables::{check_sampling, Observable};
use crate::state::{snapshot, NeuralState, StateKind};
use crate::training::metrics::{MetricContext, MetricHistory, MetricValue};

/// Whether training should continue after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Stop,
}

pub trait Callback<S> {
    fn on_train_start(&mut self, _state: &S) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_epoch_start(&mut self, _state: &S, _epoch: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_batch_start(&mut self, _state: &S, _epoch: usize, _batch: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_batch_end(&mut self, _state: &S, _epoch: usize, _batch: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _state: &S, _epoch: usize, _history: &mut MetricHistory) -> anyhow::Result<Signal> {
        Ok(Signal::Continue)
    }

    fn on_train_end(&mut self, _state: &S, _history: &MetricHistory) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered callbacks dispatched as one.
pub struct CallbackList<'a, S> {
    callbacks: Vec<Box<dyn Callback<S> + 'a>>,
}

impl<S> Default for CallbackList<'_, S> {
    fn default() -> Self {
        Self { callbacks: Vec::new() }
    }
}

impl<'a, S> CallbackList<'a, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: impl Callback<S> + 'a) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn with(mut self, callback: impl Callback<S> + 'a) -> Self {
        self.push(callback);
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<S> Callback<S> for CallbackList<'_, S> {
    fn on_train_start(&mut self, state: &S) -> anyhow::Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_train_start(state))
    }

    fn on_epoch_start(&mut self, state: &S, epoch: usize) -> anyhow::Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_epoch_start(state, epoch))
    }

    fn on_batch_start(&mut self, state: &S, epoch: usize, batch: usize) -> anyhow::Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|c| c.on_batch_start(state, epoch, batch))
    }

    fn on_batch_end(&mut self, state: &S, epoch: usize, batch: usize) -> anyhow::Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|c| c.on_batch_end(state, epoch, batch))
    }

    /// Every callback sees the epoch end; the run stops if any asks to.
    fn on_epoch_end(&mut self, state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        let mut signal = Signal::Continue;
        for callback in &mut self.callbacks {
            if callback.on_epoch_end(state, epoch, history)? == Signal::Stop {
                signal = Signal::Stop;
            }
        }
        Ok(signal)
    }

    fn on_train_end(&mut self, state: &S, history: &MetricHistory) -> anyhow::Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_train_end(state, history))
    }
}

type MetricFn<'a, B, S> = Box<dyn FnMut(&S, &MetricContext<B>) -> anyhow::Result<MetricValue> + 'a>;

struct TrackedObservable {
    name: String,
    observable: Observable,
    num_samples: usize,
    k: usize,
}

/// Evaluates named metric functions every `period` epochs and appends the
/// results to the history.
pub struct MetricEvaluator<'a, B: Backend, S> {
    period: usize,
    context: MetricContext<B>,
    metrics: Vec<(String, MetricFn<'a, B, S>)>,
    observables: Vec<TrackedObservable>,
    rng: StdRng,
    verbose: bool,
}

impl<'a, B: Backend, S: NeuralState<B>> MetricEvaluator<'a, B, S> {
    pub fn new(period: usize, context: MetricContext<B>) -> Self {
        Self {
            period: period.max(1),
            context,
            metrics: Vec::new(),
            observables: Vec::new(),
            rng: StdRng::seed_from_u64(0),
            verbose: false,
        }
    }

    pub fn with_metric<F, V>(mut self, name: &str, mut metric: F) -> Self
    where
        F: FnMut(&S, &MetricContext<B>) -> anyhow::Result<V> + 'a,
        V: Into<MetricValue>,
    {
        self.metrics
            .push((name.to_string(), Box::new(move |state, ctx| Ok(metric(state, ctx)?.into()))));
        self
    }

    /// Estimate `observable` from `num_samples` Gibbs samples (`k` steps).
    /// Records `<name>` and `<name>_variance`. Both counts must be nonzero.
    pub fn with_observable(
        mut self,
        name: &str,
        observable: Observable,
        num_samples: usize,
        k: usize,
    ) -> Result<Self, RbmError> {
        check_sampling(num_samples, k)?;
        self.observables.push(TrackedObservable {
            name: name.to_string(),
            observable,
            num_samples,
            k,
        });
        Ok(self)
    }

    /// Seed for observable sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn context(&self) -> &MetricContext<B> {
        &self.context
    }

    /// Evaluate every metric and observable now.
    pub fn evaluate(&mut self, state: &S) -> anyhow::Result<BTreeMap<String, MetricValue>> {
        let mut values = BTreeMap::new();
        for (name, metric) in &mut self.metrics {
            let value = metric(state, &self.context).map_err(|e| e.context(format!("metric {name:?} failed")))?;
            values.insert(name.clone(), value);
        }
        for entry in &self.observables {
            let stats = entry
                .observable
                .sample_statistics(state, entry.num_samples, entry.k, &mut self.rng)?;
            values.insert(entry.name.clone(), stats.mean.into());
            values.insert(format!("{}_variance", entry.name), stats.variance.into());
        }
        Ok(values)
    }
}

impl<B: Backend, S: NeuralState<B>> Callback<S> for MetricEvaluator<'_, B, S> {
    fn on_epoch_end(&mut self, state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        if epoch % self.period != 0 {
            return Ok(Signal::Continue);
        }
        let values = self.evaluate(state)?;
        if self.verbose {
            let line = values
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            tracing::info!(epoch, "{line}");
        }
        for (name, value) in values {
            history.push(&name, epoch, value);
        }
        Ok(Signal::Continue)
    }
}

/// How the change between consecutive metric values is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCriterion {
    #[default]
    Relative,
    Absolute,
}

/// Consecutive changes below `tolerance` count toward `patience`; any
/// larger change resets the count.
#[derive(Debug, Clone, Default)]
struct PatienceCounter {
    count: usize,
}

impl PatienceCounter {
    fn observe(&mut self, below_tolerance: bool) -> usize {
        self.count = if below_tolerance { self.count + 1 } else { 0 };
        self.count
    }
}

/// True when `metric` gained a record since the last check, so a pair of
/// values is never counted twice.
fn is_new_record(history: &MetricHistory, metric: &str, last_checked: &mut Option<usize>) -> bool {
    let latest = history.last_epoch(metric);
    if latest.is_none() || latest == *last_checked {
        return false;
    }
    *last_checked = latest;
    true
}

/// Stops training once a metric stops changing.
///
/// Every `period` epochs the last two recorded values of `metric` are
/// compared, provided a new value arrived since the previous check. After `patience` consecutive checks with a change below
/// `tolerance`, training stops at that epoch.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    period: usize,
    tolerance: f64,
    patience: usize,
    metric: String,
    criterion: ChangeCriterion,
    counter: PatienceCounter,
    last_checked: Option<usize>,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(period: usize, tolerance: f64, patience: usize, metric: &str) -> Self {
        Self {
            period: period.max(1),
            tolerance,
            patience: patience.max(1),
            metric: metric.to_string(),
            criterion: ChangeCriterion::Relative,
            counter: PatienceCounter::default(),
            last_checked: None,
            stopped_epoch: None,
        }
    }

    pub fn with_criterion(mut self, criterion: ChangeCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    fn change(&self, previous: f64, current: f64) -> f64 {
        let diff = (current - previous).abs();
        match self.criterion {
            ChangeCriterion::Absolute => diff,
            ChangeCriterion::Relative if previous != 0.0 => diff / previous.abs(),
            ChangeCriterion::Relative => diff,
        }
    }
}

impl<S> Callback<S> for EarlyStopping {
    fn on_epoch_end(&mut self, _state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        if epoch % self.period != 0 || !is_new_record(history, &self.metric, &mut self.last_checked) {
            return Ok(Signal::Continue);
        }
        let values = history.scalars(&self.metric);
        let [.., previous, current] = values.as_slice() else {
            return Ok(Signal::Continue);
        };
        let change = self.change(*previous, *current);
        let count = self.counter.observe(change < self.tolerance);
        if count >= self.patience {
            tracing::info!(epoch, metric = %self.metric, change, "Early stopping: metric converged");
            self.stopped_epoch = Some(epoch);
            return Ok(Signal::Stop);
        }
        Ok(Signal::Continue)
    }
}

/// Like [`EarlyStopping`], but a change counts as small when it is below
/// `tolerance * variance`. The variance is the latest value of
/// `variance_metric` when set (e.g. the `_variance` series of an
/// observable), otherwise the sample variance of the last `patience + 1`
/// values of `metric`.
#[derive(Debug, Clone)]
pub struct VarianceBasedEarlyStopping {
    period: usize,
    tolerance: f64,
    patience: usize,
    metric: String,
    variance_metric: Option<String>,
    counter: PatienceCounter,
    last_checked: Option<usize>,
    stopped_epoch: Option<usize>,
}

impl VarianceBasedEarlyStopping {
    pub fn new(period: usize, tolerance: f64, patience: usize, metric: &str) -> Self {
        Self {
            period: period.max(1),
            tolerance,
            patience: patience.max(1),
            metric: metric.to_string(),
            variance_metric: None,
            counter: PatienceCounter::default(),
            last_checked: None,
            stopped_epoch: None,
        }
    }

    pub fn with_variance_metric(mut self, name: &str) -> Self {
        self.variance_metric = Some(name.to_string());
        self
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    fn variance(&self, history: &MetricHistory, values: &[f64]) -> Option<f64> {
        match &self.variance_metric {
            Some(name) => history.last_scalar(name),
            None => {
                let window = &values[values.len().saturating_sub(self.patience + 1)..];
                if window.len() < 2 {
                    return None;
                }
                let mean = window.iter().sum::<f64>() / window.len() as f64;
                Some(window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (window.len() - 1) as f64)
            }
        }
    }
}

impl<S> Callback<S> for VarianceBasedEarlyStopping {
    fn on_epoch_end(&mut self, _state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        if epoch % self.period != 0 || !is_new_record(history, &self.metric, &mut self.last_checked) {
            return Ok(Signal::Continue);
        }
        let values = history.scalars(&self.metric);
        let [.., previous, current] = values.as_slice() else {
            return Ok(Signal::Continue);
        };
        let Some(variance) = self.variance(history, &values) else {
            return Ok(Signal::Continue);
        };
        let change = (current - previous).abs();
        let count = self.counter.observe(change < self.tolerance * variance);
        if count >= self.patience {
            tracing::info!(epoch, metric = %self.metric, change, variance, "Early stopping: change within variance");
            self.stopped_epoch = Some(epoch);
            return Ok(Signal::Stop);
        }
        Ok(Signal::Continue)
    }
}

/// Metadata written next to each saved snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub epoch: usize,
    pub kind: StateKind,
    pub metrics: BTreeMap<String, MetricValue>,
}

/// Saves state snapshots every `period` epochs.
///
/// With `keyed_by_epoch`, files are named `<stem>_epoch_<n>`; otherwise a
/// single `<stem>` snapshot is overwritten.
#[derive(Debug, Clone)]
pub struct ModelSaver<B> {
    period: usize,
    dir: PathBuf,
    stem: String,
    keyed_by_epoch: bool,
    save_initial: bool,
    saved: Vec<PathBuf>,
    _backend: PhantomData<B>,
}

impl<B: Backend> ModelSaver<B> {
    pub fn new(period: usize, dir: impl Into<PathBuf>) -> Self {
        Self {
            period: period.max(1),
            dir: dir.into(),
            stem: "state".to_string(),
            keyed_by_epoch: true,
            save_initial: false,
            saved: Vec::new(),
            _backend: PhantomData,
        }
    }

    pub fn with_stem(mut self, stem: &str) -> Self {
        self.stem = stem.to_string();
        self
    }

    pub fn with_keyed_by_epoch(mut self, keyed: bool) -> Self {
        self.keyed_by_epoch = keyed;
        self
    }

    pub fn with_save_initial(mut self, save_initial: bool) -> Self {
        self.save_initial = save_initial;
        self
    }

    /// Snapshot paths written so far, oldest first.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn path_for(&self, epoch: usize) -> PathBuf {
        if self.keyed_by_epoch {
            self.dir.join(format!("{}_epoch_{epoch}", self.stem))
        } else {
            self.dir.join(&self.stem)
        }
    }

    fn save<S: NeuralState<B>>(&mut self, state: &S, epoch: usize, history: &MetricHistory) -> anyhow::Result<()> {
        let path = self.path_for(epoch);
        snapshot::save(state, &path)?;
        let meta = SnapshotMeta {
            epoch,
            kind: state.kind(),
            metrics: history.latest(),
        };
        write_meta(&path, &meta)?;
        tracing::info!(epoch, path = %path.display(), "Snapshot saved");
        if !self.saved.contains(&path) {
            self.saved.push(path);
        }
        Ok(())
    }
}

fn write_meta(path: &Path, meta: &SnapshotMeta) -> anyhow::Result<()> {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta.json");
    let meta_path = PathBuf::from(name);
    let file = std::fs::File::create(&meta_path).with_context(|| format!("Failed to create {}", meta_path.display()))?;
    serde_json::to_writer_pretty(file, meta)?;
    Ok(())
}

impl<B: Backend, S: NeuralState<B>> Callback<S> for ModelSaver<B> {
    fn on_train_start(&mut self, state: &S) -> anyhow::Result<()> {
        if self.save_initial {
            self.save(state, 0, &MetricHistory::new())?;
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        if epoch % self.period == 0 {
            self.save(state, epoch, history)?;
        }
        Ok(Signal::Continue)
    }
}

type EpochHook<'a, S> = Box<dyn FnMut(&S, usize, &mut MetricHistory) -> anyhow::Result<Signal> + 'a>;
type BatchHook<'a, S> = Box<dyn FnMut(&S, usize, usize) -> anyhow::Result<()> + 'a>;

/// Callback assembled from closures.
pub struct LambdaCallback<'a, S> {
    on_batch_end: Option<BatchHook<'a, S>>,
    on_epoch_end: Option<EpochHook<'a, S>>,
}

impl<S> Default for LambdaCallback<'_, S> {
    fn default() -> Self {
        Self {
            on_batch_end: None,
            on_epoch_end: None,
        }
    }
}

impl<'a, S> LambdaCallback<'a, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_batch_end(mut self, hook: impl FnMut(&S, usize, usize) -> anyhow::Result<()> + 'a) -> Self {
        self.on_batch_end = Some(Box::new(hook));
        self
    }

    pub fn on_epoch_end(
        mut self,
        hook: impl FnMut(&S, usize, &mut MetricHistory) -> anyhow::Result<Signal> + 'a,
    ) -> Self {
        self.on_epoch_end = Some(Box::new(hook));
        self
    }
}

impl<S> Callback<S> for LambdaCallback<'_, S> {
    fn on_batch_end(&mut self, state: &S, epoch: usize, batch: usize) -> anyhow::Result<()> {
        match &mut self.on_batch_end {
            Some(hook) => hook(state, epoch, batch),
            None => Ok(()),
        }
    }

    fn on_epoch_end(&mut self, state: &S, epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        match &mut self.on_epoch_end {
            Some(hook) => hook(state, epoch, history),
            None => Ok(Signal::Continue),
        }
    }
}

/// Logs wall-clock time per epoch and for the whole run.
#[derive(Debug, Clone)]
pub struct Timer {
    run_start: Instant,
    epoch_start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            run_start: now,
            epoch_start: now,
        }
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Callback<S> for Timer {
    fn on_train_start(&mut self, _state: &S) -> anyhow::Result<()> {
        self.run_start = Instant::now();
        Ok(())
    }

    fn on_epoch_start(&mut self, _state: &S, _epoch: usize) -> anyhow::Result<()> {
        self.epoch_start = Instant::now();
        Ok(())
    }

    fn on_epoch_end(&mut self, _state: &S, epoch: usize, _history: &mut MetricHistory) -> anyhow::Result<Signal> {
        tracing::debug!(
            epoch,
            elapsed_secs = format!("{:.3}", self.epoch_start.elapsed().as_secs_f64()),
            "Epoch finished"
        );
        Ok(Signal::Continue)
    }

    fn on_train_end(&mut self, _state: &S, _history: &MetricHistory) -> anyhow::Result<()> {
        tracing::info!(
            elapsed_secs = format!("{:.1}", self.run_start.elapsed().as_secs_f64()),
            "Training finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_metric(stopper: &mut impl Callback<()>, metric: &str, values: &[f64]) -> Option<usize> {
        let mut history = MetricHistory::new();
        for (i, &value) in values.iter().enumerate() {
            let epoch = i + 1;
            history.push(metric, epoch, value);
            if stopper.on_epoch_end(&(), epoch, &mut history).unwrap() == Signal::Stop {
                return Some(epoch);
            }
        }
        None
    }

    #[test]
    fn test_early_stopping_halts_at_patience() {
        let mut stopper = EarlyStopping::new(1, 1e-3, 3, "loss").with_criterion(ChangeCriterion::Absolute);
        let values = [1.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5];
        // Epoch 2 changes by 0.5; epochs 3, 4, 5 are flat.
        assert_eq!(run_metric(&mut stopper, "loss", &values), Some(5));
        assert_eq!(stopper.stopped_epoch(), Some(5));
    }

    #[test]
    fn test_early_stopping_resets_on_large_change() {
        let mut stopper = EarlyStopping::new(1, 0.01, 2, "loss");
        let values = [1.0, 1.0, 2.0, 2.0, 2.0];
        // Relative changes: -, 0, 1.0 (reset), 0, 0.
        assert_eq!(run_metric(&mut stopper, "loss", &values), Some(5));

        let mut never = EarlyStopping::new(1, 0.01, 2, "loss");
        assert_eq!(run_metric(&mut never, "loss", &[1.0, 2.0, 1.0, 2.0]), None);
    }

    #[test]
    fn test_early_stopping_respects_period() {
        let mut stopper = EarlyStopping::new(2, 1e-3, 1, "loss");
        assert_eq!(run_metric(&mut stopper, "loss", &[1.0, 1.0, 1.0]), Some(2));
        let mut stopper = EarlyStopping::new(2, 1e-3, 1, "loss");
        assert_eq!(run_metric(&mut stopper, "loss", &[1.0, 2.0, 2.0, 2.0]), Some(4));
    }

    #[test]
    fn test_variance_based_early_stopping() {
        let mut stopper = VarianceBasedEarlyStopping::new(1, 1.0, 2, "energy").with_variance_metric("energy_variance");
        let mut history = MetricHistory::new();
        let energies = [-1.0, -1.5, -1.55, -1.56];
        let mut stopped = None;
        for (i, &e) in energies.iter().enumerate() {
            let epoch = i + 1;
            history.push("energy", epoch, e);
            history.push("energy_variance", epoch, 0.1);
            if stopper.on_epoch_end(&(), epoch, &mut history).unwrap() == Signal::Stop {
                stopped = Some(epoch);
                break;
            }
        }
        // 0.5 > 0.1, then 0.05 and 0.01 are both below 0.1.
        assert_eq!(stopped, Some(4));

        let mut windowed = VarianceBasedEarlyStopping::new(1, 1e-6, 1, "x");
        assert_eq!(run_metric(&mut windowed, "x", &[1.0, 2.0, 3.0]), None);
        let mut windowed = VarianceBasedEarlyStopping::new(1, 1.0, 1, "x");
        // Two-value window: variance is d^2 / 2, so only a large step qualifies.
        assert_eq!(run_metric(&mut windowed, "x", &[1.0, 4.0]), Some(2));
    }

    fn run_sparse_metric(stopper: &mut impl Callback<()>, every: usize, epochs: usize) -> Option<usize> {
        let mut history = MetricHistory::new();
        for epoch in 1..=epochs {
            if epoch % every == 0 {
                history.push("loss", epoch, 1.0);
                history.push("loss_variance", epoch, 0.1);
            }
            if stopper.on_epoch_end(&(), epoch, &mut history).unwrap() == Signal::Stop {
                return Some(epoch);
            }
        }
        None
    }

    #[test]
    fn test_early_stopping_counts_each_evaluation_once() {
        // Metric every 5 epochs, checked every epoch: the flat pairs land at
        // epochs 10, 15 and 20, so patience 3 is reached at 20, not 12.
        let mut stopper = EarlyStopping::new(1, 1e-3, 3, "loss");
        assert_eq!(run_sparse_metric(&mut stopper, 5, 30), Some(20));

        let mut stopper = VarianceBasedEarlyStopping::new(1, 1.0, 3, "loss").with_variance_metric("loss_variance");
        assert_eq!(run_sparse_metric(&mut stopper, 5, 30), Some(20));

        let mut stopper = EarlyStopping::new(1, 1e-3, 3, "loss");
        assert_eq!(run_sparse_metric(&mut stopper, 5, 19), None);
    }

    #[test]
    fn test_metric_evaluator_rejects_empty_observable_sampling() {
        use crate::state::PositiveWavefunction;
        use burn::backend::NdArray;

        type TestBackend = NdArray<f64>;
        let device = Default::default();
        let evaluator = || {
            MetricEvaluator::<TestBackend, PositiveWavefunction<TestBackend>>::new(
                1,
                MetricContext::new(2, &device).unwrap(),
            )
        };
        let observable = Observable::SigmaZ { absolute: false };
        assert!(matches!(
            evaluator().with_observable("sz", observable, 0, 10),
            Err(RbmError::InvalidConfig(_))
        ));
        assert!(matches!(
            evaluator().with_observable("sz", observable, 100, 0),
            Err(RbmError::InvalidConfig(_))
        ));
        assert!(evaluator().with_observable("sz", observable, 100, 10).is_ok());
    }

    #[test]
    fn test_callback_list_stops_if_any_callback_stops() {
        let mut seen = Vec::new();
        {
            let mut list: CallbackList<'_, ()> = CallbackList::new()
                .with(LambdaCallback::<()>::new().on_epoch_end(|_, epoch, _| {
                    Ok(if epoch == 2 { Signal::Stop } else { Signal::Continue })
                }))
                .with(LambdaCallback::<()>::new().on_epoch_end(|_, epoch, _| {
                    seen.push(epoch);
                    Ok(Signal::Continue)
                }));
            let mut history = MetricHistory::new();
            assert_eq!(list.on_epoch_end(&(), 1, &mut history).unwrap(), Signal::Continue);
            assert_eq!(list.on_epoch_end(&(), 2, &mut history).unwrap(), Signal::Stop);
            assert_eq!(list.len(), 2);
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_callback_errors_propagate() {
        let mut list: CallbackList<'_, ()> = CallbackList::new().with(
            LambdaCallback::<()>::new().on_batch_end(|_, _, batch| {
                anyhow::ensure!(batch < 1, "degenerate batch {batch}");
                Ok(())
            }),
        );
        assert!(list.on_batch_end(&(), 1, 0).is_ok());
        let err = list.on_batch_end(&(), 1, 1).unwrap_err();
        assert!(err.to_string().contains("degenerate batch 1"));
    }
}
