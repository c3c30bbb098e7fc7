//! Subcommand implementations: training runs, synthetic data generation,
//! dataset summaries and sampling from snapshots.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, Optimizer, SgdConfig};
use indicatif::{ProgressBar, ProgressStyle};
use measurements::{Basis, MeasurementReader, MeasurementWriter, TargetState, TrainingSet};
use rand::rngs::StdRng;
use rand::SeedableRng;

use rbm::exact::ExactState;
use rbm::model::bridge::tensor_to_configs;
use rbm::synthetic::{adjacent_pair_bases, ghz, sample_measurements, w_state};
use rbm::training::callbacks::{
    Callback, CallbackList, EarlyStopping, MetricEvaluator, ModelSaver, Signal, Timer, VarianceBasedEarlyStopping,
};
use rbm::training::metrics::{self, MetricContext, MetricHistory};
use rbm::training::trainer::{fit, FitOutcome, OBJECTIVE_METRIC};
use rbm::{
    ComplexWavefunction, ComplexWavefunctionConfig, DensityMatrix, DensityMatrixConfig, NeuralState,
    PositiveWavefunction, PositiveWavefunctionConfig, StateKind, Unitaries,
};

use crate::config::{apply_overrides, load_train_toml, OptimizerKind, TrainOverrides, TrainToml};
use crate::results::{run_dir, TrainSummary};

type TrainBackend = Autodiff<NdArray<f64>>;
type SampleBackend = NdArray<f64>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the train config TOML file.
    pub config: Option<PathBuf>,
    pub samples: PathBuf,
    pub bases: PathBuf,
    /// Pure target amplitudes, or the real part of a density matrix when
    /// `target_imag` is given.
    pub target: Option<PathBuf>,
    pub target_imag: Option<PathBuf>,
    /// Bases for KL evaluation; the data's own bases when absent.
    pub basis_list: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub run_index: Option<u64>,
    pub epochs: Option<usize>,
    pub seed: Option<u64>,
    pub kind: Option<StateKind>,
}

/// Synthetic target for the `generate` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SyntheticState {
    W,
    Ghz,
}

/// Measurement bases for the `generate` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BasisSet {
    /// Computational basis only.
    Computational,
    /// Computational basis plus every X/Y pair on neighbouring sites.
    Pairs,
}

/// Arguments for the `generate` subcommand.
#[derive(Debug)]
pub struct GenerateArgs {
    pub state: SyntheticState,
    pub sites: usize,
    pub bases: BasisSet,
    pub shots: usize,
    pub output_dir: PathBuf,
    pub seed: u64,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub samples: PathBuf,
    pub bases: PathBuf,
    pub json: bool,
}

/// Arguments for the `sample` subcommand.
#[derive(Debug)]
pub struct SampleArgs {
    /// Snapshot path without extension.
    pub checkpoint: PathBuf,
    pub kind: StateKind,
    pub num_samples: usize,
    pub k: usize,
    pub output: PathBuf,
    pub seed: u64,
}

/// Drives an `indicatif` bar from epoch-end events.
struct ProgressCallback {
    pb: ProgressBar,
}

impl ProgressCallback {
    fn new(epochs: usize) -> anyhow::Result<Self> {
        let pb = ProgressBar::new(epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta}) {msg}")?
                .progress_chars("=> "),
        );
        Ok(Self { pb })
    }
}

impl<S> Callback<S> for ProgressCallback {
    fn on_epoch_end(&mut self, _state: &S, _epoch: usize, history: &mut MetricHistory) -> anyhow::Result<Signal> {
        if let Some(objective) = history.last_scalar(OBJECTIVE_METRIC) {
            self.pb.set_message(format!("objective={objective:.4}"));
        }
        self.pb.inc(1);
        Ok(Signal::Continue)
    }

    fn on_train_end(&mut self, _state: &S, _history: &MetricHistory) -> anyhow::Result<()> {
        self.pb.finish_with_message("done");
        Ok(())
    }
}

/// Everything a training run needs besides the state itself.
struct TrainRun<'a> {
    toml: &'a TrainToml,
    data: &'a TrainingSet,
    target: Option<ExactState>,
    basis_list: Vec<Basis>,
    unitaries: Unitaries,
    run_dir: PathBuf,
    device: <TrainBackend as burn::prelude::Backend>::Device,
}

/// What a finished run reports back for the summary.
struct RunReport {
    history: MetricHistory,
    epochs_completed: usize,
    stopped_early: bool,
    snapshot: PathBuf,
}

impl TrainRun<'_> {
    fn execute<S>(&self, state: S) -> anyhow::Result<RunReport>
    where
        S: NeuralState<TrainBackend> + AutodiffModule<TrainBackend> + 'static,
    {
        let section = &self.toml.optimizer;
        let clipping = section.max_grad_norm.map(|n| GradientClippingConfig::Norm(n as f32));
        let weight_decay = section.weight_decay.map(|p| WeightDecayConfig::new(p as f32));
        let outcome = match section.kind {
            OptimizerKind::Sgd => {
                let mut optimizer = SgdConfig::new()
                    .with_momentum(section.momentum.map(|m| MomentumConfig::new().with_momentum(m)))
                    .with_weight_decay(weight_decay)
                    .with_gradient_clipping(clipping)
                    .init::<TrainBackend, S>();
                self.fit_with(state, &mut optimizer)?
            }
            OptimizerKind::Adam => {
                let mut optimizer = AdamConfig::new()
                    .with_weight_decay(weight_decay)
                    .with_grad_clipping(clipping)
                    .init::<TrainBackend, S>();
                self.fit_with(state, &mut optimizer)?
            }
        };

        let snapshot = self.run_dir.join("final");
        outcome.state.save(&snapshot)?;
        outcome.history.save_json(&self.run_dir.join("history.json"))?;
        Ok(RunReport {
            history: outcome.history,
            epochs_completed: outcome.epochs_completed,
            stopped_early: outcome.stopped_early,
            snapshot,
        })
    }

    fn metric_evaluator<S>(&self) -> anyhow::Result<Option<MetricEvaluator<'static, TrainBackend, S>>>
    where
        S: NeuralState<TrainBackend> + 'static,
    {
        let section = &self.toml.metrics;
        let with_target = self.target.is_some() && (section.fidelity || section.kl);
        if !with_target && !section.nll && section.observables.is_empty() {
            return Ok(None);
        }

        let mut context = MetricContext::new(self.data.num_sites(), &self.device)?
            .with_bases(self.basis_list.clone())
            .with_unitaries(self.unitaries.clone());
        if let Some(target) = &self.target {
            context = context.with_target(target.clone());
        }
        if section.nll {
            context = context.with_data(self.data.clone());
        }

        let mut evaluator = MetricEvaluator::<TrainBackend, S>::new(section.period, context)
            .with_seed(self.toml.fit.seed)
            .with_verbose(section.verbose);
        if self.target.is_some() && section.fidelity {
            evaluator = evaluator.with_metric("fidelity", metrics::fidelity);
        }
        if self.target.is_some() && section.kl {
            evaluator = evaluator.with_metric("kl", metrics::kl_divergence);
        }
        if section.nll {
            evaluator = evaluator.with_metric("nll", metrics::negative_log_likelihood);
        }
        for entry in &section.observables {
            evaluator = evaluator
                .with_observable(&entry.name, entry.observable, entry.num_samples, entry.k)
                .with_context(|| format!("observable {:?}", entry.name))?;
        }
        Ok(Some(evaluator))
    }

    fn fit_with<S, O>(&self, state: S, optimizer: &mut O) -> anyhow::Result<FitOutcome<S>>
    where
        S: NeuralState<TrainBackend> + AutodiffModule<TrainBackend> + 'static,
        O: Optimizer<S, TrainBackend>,
    {
        let fit_config = self.toml.fit.to_fit_config();
        let mut callbacks = CallbackList::new()
            .with(ProgressCallback::new(fit_config.epochs)?)
            .with(Timer::new());
        if let Some(evaluator) = self.metric_evaluator::<S>()? {
            callbacks.push(evaluator);
        }
        if let Some(early) = &self.toml.early_stopping {
            if early.variance_based {
                let mut stopper =
                    VarianceBasedEarlyStopping::new(early.period, early.tolerance, early.patience, &early.metric);
                if let Some(name) = &early.variance_metric {
                    stopper = stopper.with_variance_metric(name);
                }
                callbacks.push(stopper);
            } else {
                callbacks.push(
                    EarlyStopping::new(early.period, early.tolerance, early.patience, &early.metric)
                        .with_criterion(early.criterion),
                );
            }
        }
        if let Some(period) = self.toml.checkpoint.period {
            callbacks.push(
                ModelSaver::<TrainBackend>::new(period, self.run_dir.join("checkpoints"))
                    .with_keyed_by_epoch(self.toml.checkpoint.keyed_by_epoch)
                    .with_save_initial(self.toml.checkpoint.save_initial),
            );
        }

        fit(&fit_config, state, self.data, &self.unitaries, optimizer, &mut callbacks)
    }
}

fn read_target(args: &TrainArgs) -> anyhow::Result<Option<TargetState>> {
    Ok(match (&args.target, &args.target_imag) {
        (Some(psi), None) => Some(MeasurementReader::read_target_psi(psi)?),
        (Some(real), Some(imag)) => Some(MeasurementReader::read_target_density(real, imag)?),
        (None, Some(_)) => anyhow::bail!("--target-imag requires --target"),
        (None, None) => None,
    })
}

/// Train one NN-state on measurement files and write its snapshot, metric
/// history and summary into the run directory.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Config
    let mut toml = load_train_toml(args.config.as_deref())?;
    apply_overrides(
        &mut toml,
        TrainOverrides {
            epochs: args.epochs,
            seed: args.seed,
            kind: args.kind,
            run_index: args.run_index,
        },
    );
    toml.validate()?;

    // 2. Data
    let data = MeasurementReader::read_training_set(&args.samples, &args.bases)?;
    let target = read_target(&args)?;
    if let Some(target) = &target {
        anyhow::ensure!(
            target.num_sites() == data.num_sites(),
            "target has {} sites but the data has {}",
            target.num_sites(),
            data.num_sites()
        );
    }
    let basis_list = match &args.basis_list {
        Some(path) => MeasurementReader::read_basis_list(path)?,
        None => data.unique_bases(),
    };
    let unitaries = Unitaries::standard().with_max_rotated_sites(toml.model.max_rotated_sites);

    let run_dir = run_dir(&args.output_dir, args.run_index);
    std::fs::create_dir_all(&run_dir).with_context(|| format!("Failed to create {}", run_dir.display()))?;

    // 3. State
    let num_sites = data.num_sites();
    let num_hidden = toml.model.num_hidden.unwrap_or(num_sites);
    let num_aux = toml.model.num_aux.unwrap_or(num_sites);
    let kind = toml.model.kind;
    let seed = toml.fit.seed;
    tracing::info!(%kind, num_sites, num_hidden, seed, run_dir = %run_dir.display(), "Building state");

    let run = TrainRun {
        toml: &toml,
        data: &data,
        target: target.as_ref().map(ExactState::from_target),
        basis_list,
        unitaries,
        run_dir: run_dir.clone(),
        device: Default::default(),
    };
    // Parameters draw from a stream separate from the trainer's.
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let scale = toml.model.init_scale;
    let report = match kind {
        StateKind::Positive => run.execute(
            PositiveWavefunctionConfig::new(num_sites, num_hidden)
                .with_init_scale(scale)
                .init::<TrainBackend, _>(&mut rng, &run.device),
        )?,
        StateKind::Complex => run.execute(
            ComplexWavefunctionConfig::new(num_sites, num_hidden)
                .with_init_scale(scale)
                .init::<TrainBackend, _>(&mut rng, &run.device),
        )?,
        StateKind::Density => run.execute(
            DensityMatrixConfig::new(num_sites, num_hidden, num_aux)
                .with_init_scale(scale)
                .init::<TrainBackend, _>(&mut rng, &run.device),
        )?,
    };

    // 4. Summary
    let summary = TrainSummary {
        run_index: args.run_index,
        kind,
        num_sites,
        num_hidden,
        num_aux: (kind == StateKind::Density).then_some(num_aux),
        num_samples: data.len(),
        seed,
        epochs_completed: report.epochs_completed,
        stopped_early: report.stopped_early,
        elapsed_secs: start.elapsed().as_secs_f64(),
        final_metrics: report.history.latest(),
        snapshot: report.snapshot.display().to_string(),
    };
    summary.save(&run_dir.join("summary.json"))?;
    summary.print();

    Ok(())
}

/// Sample measurement shots of a synthetic target and write the data files.
pub fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let target = match args.state {
        SyntheticState::W => w_state(args.sites)?,
        SyntheticState::Ghz => ghz(args.sites)?,
    };
    let bases = match args.bases {
        BasisSet::Computational => vec![Basis::computational(args.sites)],
        BasisSet::Pairs => adjacent_pair_bases(args.sites),
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let data = sample_measurements(
        &ExactState::from_target(&target),
        &bases,
        args.shots,
        &Unitaries::standard(),
        &mut rng,
    )?;

    let mut writer = MeasurementWriter::new();
    writer.record_all(&data);
    writer.finish(&args.output_dir.join("samples.txt"), &args.output_dir.join("bases.txt"))?;
    MeasurementWriter::write_basis_list(&args.output_dir.join("basis_list.txt"), &bases)?;
    MeasurementWriter::write_target_psi(&args.output_dir.join("psi.txt"), &target)?;

    println!("--- Generated Data ---");
    println!("Target: {:?} on {} sites", args.state, args.sites);
    println!("Bases: {}", bases.len());
    println!("Shots: {}", data.len());
    println!("Output: {}", args.output_dir.display());
    Ok(())
}

/// Print statistics of a measurement dataset.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let data = MeasurementReader::read_training_set(&args.samples, &args.bases)?;
    let summary = data.summary();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("--- Measurement Summary ---");
        println!("Samples: {}", args.samples.display());
        print!("{summary}");
    }
    Ok(())
}

fn draw_samples<S: NeuralState<SampleBackend>>(state: &S, args: &SampleArgs) -> anyhow::Result<TrainingSet> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let configs = tensor_to_configs(state.sample(args.num_samples, args.k, &mut rng));
    let bases = vec![Basis::computational(state.num_visible()); configs.len()];
    let mut writer = MeasurementWriter::new();
    for (config, basis) in configs.into_iter().zip(bases) {
        writer.record(config, basis);
    }
    Ok(writer.finish(&args.output, &bases_path(&args.output))?)
}

/// Companion basis file written next to sampled shots.
fn bases_path(samples: &Path) -> PathBuf {
    samples.with_extension("bases.txt")
}

/// Draw computational-basis samples from a saved snapshot.
pub fn run_sample(args: SampleArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.num_samples > 0, "--num-samples must be positive");
    let device = Default::default();
    let start = Instant::now();
    let data = match args.kind {
        StateKind::Positive => draw_samples(&PositiveWavefunction::<SampleBackend>::load(&args.checkpoint, &device)?, &args)?,
        StateKind::Complex => draw_samples(&ComplexWavefunction::<SampleBackend>::load(&args.checkpoint, &device)?, &args)?,
        StateKind::Density => draw_samples(&DensityMatrix::<SampleBackend>::load(&args.checkpoint, &device)?, &args)?,
    };

    println!("--- Sampling Summary ---");
    println!("Checkpoint: {} ({})", args.checkpoint.display(), args.kind);
    println!("Samples: {} (k = {})", data.len(), args.k);
    println!("Output: {}", args.output.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bases_path() {
        assert_eq!(bases_path(Path::new("out/samples.txt")), Path::new("out/samples.bases.txt"));
    }

    #[test]
    fn test_generate_then_train_then_sample() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        run_generate(GenerateArgs {
            state: SyntheticState::W,
            sites: 2,
            bases: BasisSet::Pairs,
            shots: 20,
            output_dir: data_dir.clone(),
            seed: 1,
        })
        .unwrap();
        assert!(data_dir.join("basis_list.txt").exists());

        let config_path = tmp.path().join("train.toml");
        std::fs::write(
            &config_path,
            "[model]\nkind = \"complex\"\n\n[fit]\nepochs = 2\npos_batch_size = 25\nk = 1\nlog_interval = 0\n\n[metrics]\nperiod = 1\n\n[checkpoint]\nperiod = 1\n",
        )
        .unwrap();
        let output_dir = tmp.path().join("runs");
        run_train(TrainArgs {
            config: Some(config_path),
            samples: data_dir.join("samples.txt"),
            bases: data_dir.join("bases.txt"),
            target: Some(data_dir.join("psi.txt")),
            target_imag: None,
            basis_list: Some(data_dir.join("basis_list.txt")),
            output_dir: output_dir.clone(),
            run_index: Some(3),
            epochs: None,
            seed: None,
            kind: None,
        })
        .unwrap();

        let run_dir = output_dir.join("run_3");
        let summary = TrainSummary::load(&run_dir.join("summary.json")).unwrap();
        assert_eq!(summary.kind, StateKind::Complex);
        assert_eq!(summary.epochs_completed, 2);
        assert_eq!(summary.seed, 3);
        assert!(summary.final_metrics.contains_key("fidelity"));
        assert!(summary.final_metrics.contains_key("kl"));
        assert!(run_dir.join("history.json").exists());
        assert!(run_dir.join("checkpoints/state_epoch_2.mpk").exists());

        let samples_out = tmp.path().join("drawn/samples.txt");
        run_sample(SampleArgs {
            checkpoint: run_dir.join("final"),
            kind: StateKind::Complex,
            num_samples: 16,
            k: 2,
            output: samples_out.clone(),
            seed: 0,
        })
        .unwrap();
        let drawn = MeasurementReader::read_training_set(&samples_out, &bases_path(&samples_out)).unwrap();
        assert_eq!(drawn.len(), 16);
        assert_eq!(drawn.num_sites(), 2);
    }
}
