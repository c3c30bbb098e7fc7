//! Named metric series recorded during training, and the standard metric
//! functions evaluated against an enumerated Hilbert space.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use burn::prelude::*;
use measurements::{Basis, TrainingSet};
use serde::{Deserialize, Serialize};

use crate::error::RbmError;
use crate::exact::{self, ExactState};
use crate::model::bridge::{tensor_to_f64, tensor_to_vec};
use crate::state::{generate_hilbert_space, log_prob_by_basis, NeuralState};
use crate::unitaries::Unitaries;

/// Batch size used when scoring a full dataset.
const NLL_CHUNK: usize = 1024;

/// Value produced by a metric function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Array(Vec<f64>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(x) => Some(*x),
            Self::Array(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(values)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(x) => write!(f, "{x:.6}"),
            Self::Array(xs) => write!(f, "[{} values]", xs.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub epoch: usize,
    pub value: MetricValue,
}

/// Append-only metric series keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricHistory {
    series: BTreeMap<String, Vec<MetricRecord>>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, epoch: usize, value: impl Into<MetricValue>) {
        self.series.entry(name.to_string()).or_default().push(MetricRecord {
            epoch,
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&[MetricRecord]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn last(&self, name: &str) -> Option<&MetricValue> {
        self.series.get(name).and_then(|s| s.last()).map(|r| &r.value)
    }

    pub fn last_scalar(&self, name: &str) -> Option<f64> {
        self.last(name).and_then(MetricValue::as_scalar)
    }

    /// Epoch of the newest record of a series.
    pub fn last_epoch(&self, name: &str) -> Option<usize> {
        self.series.get(name).and_then(|s| s.last()).map(|r| r.epoch)
    }

    /// Scalar values of a series in recording order; array entries are skipped.
    pub fn scalars(&self, name: &str) -> Vec<f64> {
        self.get(name)
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r.value.as_scalar())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Latest value of every series.
    pub fn latest(&self) -> BTreeMap<String, MetricValue> {
        self.series
            .iter()
            .filter_map(|(name, s)| s.last().map(|r| (name.clone(), r.value.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Inputs available to metric functions.
#[derive(Debug, Clone)]
pub struct MetricContext<B: Backend> {
    /// Enumerated Hilbert space, `(2^n, n)`.
    pub space: Tensor<B, 2>,
    pub target: Option<ExactState>,
    /// Bases for KL divergence; empty means the computational basis.
    pub bases: Vec<Basis>,
    pub unitaries: Unitaries,
    pub data: Option<TrainingSet>,
}

impl<B: Backend> MetricContext<B> {
    pub fn new(num_sites: usize, device: &B::Device) -> Result<Self, RbmError> {
        Ok(Self {
            space: generate_hilbert_space(num_sites, device)?,
            target: None,
            bases: Vec::new(),
            unitaries: Unitaries::standard(),
            data: None,
        })
    }

    pub fn with_target(mut self, target: ExactState) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_bases(mut self, bases: Vec<Basis>) -> Self {
        self.bases = bases;
        self
    }

    pub fn with_unitaries(mut self, unitaries: Unitaries) -> Self {
        self.unitaries = unitaries;
        self
    }

    pub fn with_data(mut self, data: TrainingSet) -> Self {
        self.data = Some(data);
        self
    }

    fn target(&self) -> anyhow::Result<&ExactState> {
        self.target.as_ref().context("metric requires a target state")
    }
}

pub fn fidelity<B: Backend, S: NeuralState<B>>(state: &S, ctx: &MetricContext<B>) -> anyhow::Result<f64> {
    let model = state.exact_state(ctx.space.clone());
    Ok(exact::fidelity(ctx.target()?, &model))
}

pub fn infidelity<B: Backend, S: NeuralState<B>>(state: &S, ctx: &MetricContext<B>) -> anyhow::Result<f64> {
    Ok(1.0 - fidelity(state, ctx)?)
}

pub fn kl_divergence<B: Backend, S: NeuralState<B>>(state: &S, ctx: &MetricContext<B>) -> anyhow::Result<f64> {
    let model = state.exact_state(ctx.space.clone());
    Ok(exact::kl_divergence(ctx.target()?, &model, &ctx.bases, &ctx.unitaries)?)
}

/// Mean `-log p_b(sample)` of the context's measurement data, normalized
/// over the enumerated space.
pub fn negative_log_likelihood<B: Backend, S: NeuralState<B>>(
    state: &S,
    ctx: &MetricContext<B>,
) -> anyhow::Result<f64> {
    let data = ctx.data.as_ref().context("negative log-likelihood requires measurement data")?;
    let log_norm = tensor_to_f64(state.log_normalization(ctx.space.clone()));
    let mut total = 0.0;
    for (samples, bases) in data.samples().chunks(NLL_CHUNK).zip(data.bases().chunks(NLL_CHUNK)) {
        let log_probs = log_prob_by_basis(state, samples, bases, &ctx.unitaries)?;
        total += tensor_to_vec(log_probs).iter().map(|lp| log_norm - lp).sum::<f64>();
    }
    Ok(total / data.len() as f64)
}

/// `sum |psi|^2` or `Tr rho` over the enumerated space.
pub fn normalization<B: Backend, S: NeuralState<B>>(state: &S, ctx: &MetricContext<B>) -> anyhow::Result<f64> {
    Ok(state.compute_normalization(ctx.space.clone()))
}
