//! Integration tests for the rbm crate.
//!
//! These exercise full training runs: synthetic or file-loaded measurement
//! data -> fit -> callbacks -> exact statistics and snapshots. All use the
//! NdArray backend in double precision.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, SgdConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use measurements::{Basis, MeasurementReader, MeasurementWriter, TrainingSet};
use rbm::exact::ExactState;
use rbm::model::bridge::tensor_to_vec;
use rbm::state::generate_hilbert_space;
use rbm::synthetic::{adjacent_pair_bases, sample_measurements, w_state};
use rbm::training::callbacks::{
    CallbackList, ChangeCriterion, EarlyStopping, LambdaCallback, MetricEvaluator, ModelSaver, Signal, SnapshotMeta,
};
use rbm::training::metrics::{self, MetricContext};
use rbm::training::trainer::{fit, FitConfig, OBJECTIVE_METRIC};
use rbm::{
    ComplexWavefunction, ComplexWavefunctionConfig, DensityMatrix, DensityMatrixConfig, NeuralState,
    PositiveWavefunction, PositiveWavefunctionConfig, Unitaries,
};

type TestAutodiffBackend = Autodiff<NdArray<f64>>;

fn w_state_data(num_sites: usize, bases: &[Basis], shots: usize, seed: u64) -> (ExactState, TrainingSet) {
    let target = ExactState::from_target(&w_state(num_sites).unwrap());
    let mut rng = StdRng::seed_from_u64(seed);
    let data = sample_measurements(&target, bases, shots, &Unitaries::standard(), &mut rng).unwrap();
    (target, data)
}

#[test]
fn test_positive_wavefunction_learns_w_state_distribution() {
    let device = Default::default();
    let (target, data) = w_state_data(3, &[Basis::computational(3)], 300, 1);
    let mut rng = StdRng::seed_from_u64(2);
    let state = PositiveWavefunctionConfig::new(3, 3).init::<TestAutodiffBackend, _>(&mut rng, &device);

    let ctx = MetricContext::<TestAutodiffBackend>::new(3, &device)
        .unwrap()
        .with_target(target);
    let kl_before = metrics::kl_divergence(&state, &ctx).unwrap();

    let config = FitConfig::new()
        .with_epochs(60)
        .with_pos_batch_size(50)
        .with_k(5)
        .with_lr(0.1)
        .with_seed(3)
        .with_log_interval(0);
    let mut optimizer = SgdConfig::new().init::<TestAutodiffBackend, PositiveWavefunction<TestAutodiffBackend>>();
    let mut callbacks = CallbackList::new();
    let outcome = fit(&config, state, &data, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    let kl_after = metrics::kl_divergence(&outcome.state, &ctx).unwrap();
    assert!(
        kl_after < kl_before,
        "KL should decrease: before={kl_before:.4}, after={kl_after:.4}"
    );
    assert_eq!(outcome.history.scalars(OBJECTIVE_METRIC).len(), 60);
}

/// Two-site W state from five bases (ZZ, XX, XY, YX, YY) at 180 shots
/// each. Only tempered chains move between `01` and `10`; without them
/// the fit settles on one of the two.
#[test]
fn test_complex_wavefunction_reconstructs_w_state() {
    let device = Default::default();
    let bases = adjacent_pair_bases(2);
    assert_eq!(bases.len(), 5);
    let (target, data) = w_state_data(2, &bases, 180, 10);
    assert_eq!(data.len(), 900);

    let mut rng = StdRng::seed_from_u64(11);
    let state = ComplexWavefunctionConfig::new(2, 2).init::<TestAutodiffBackend, _>(&mut rng, &device);
    let ctx = MetricContext::<TestAutodiffBackend>::new(2, &device)
        .unwrap()
        .with_target(target)
        .with_bases(bases);

    let config = FitConfig::new()
        .with_epochs(500)
        .with_pos_batch_size(100)
        .with_k(10)
        .with_lr(0.01)
        .with_num_temperatures(4)
        .with_seed(12)
        .with_log_interval(100);
    let mut optimizer = AdamConfig::new().init::<TestAutodiffBackend, ComplexWavefunction<TestAutodiffBackend>>();
    let mut callbacks = CallbackList::new().with(
        MetricEvaluator::<TestAutodiffBackend, ComplexWavefunction<TestAutodiffBackend>>::new(100, ctx.clone())
            .with_metric("fidelity", metrics::fidelity)
            .with_metric("kl", metrics::kl_divergence)
            .with_verbose(true),
    );
    let outcome = fit(&config, state, &data, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    let fidelity = metrics::fidelity(&outcome.state, &ctx).unwrap();
    let kl = metrics::kl_divergence(&outcome.state, &ctx).unwrap();
    assert!(fidelity > 0.9, "fidelity {fidelity:.4}");
    assert!(kl < 0.02, "KL {kl:.4}");
    assert_eq!(outcome.history.scalars("fidelity").len(), 5);
}

#[test]
fn test_density_matrix_trains_on_rotated_data() {
    let device = Default::default();
    let (target, data) = w_state_data(2, &adjacent_pair_bases(2), 40, 20);
    let mut rng = StdRng::seed_from_u64(21);
    let state = DensityMatrixConfig::new(2, 2, 2).init::<TestAutodiffBackend, _>(&mut rng, &device);

    let config = FitConfig::new()
        .with_epochs(3)
        .with_pos_batch_size(40)
        .with_neg_batch_size(Some(20))
        .with_k(2)
        .with_lr(0.05)
        .with_log_interval(0);
    let ctx = MetricContext::<TestAutodiffBackend>::new(2, &device)
        .unwrap()
        .with_target(target);
    let mut optimizer = SgdConfig::new().init::<TestAutodiffBackend, DensityMatrix<TestAutodiffBackend>>();
    let mut callbacks = CallbackList::new().with(
        MetricEvaluator::<TestAutodiffBackend, DensityMatrix<TestAutodiffBackend>>::new(1, ctx)
            .with_metric("fidelity", metrics::fidelity),
    );
    let outcome = fit(&config, state, &data, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    assert_eq!(outcome.epochs_completed, 3);
    let fidelities = outcome.history.scalars("fidelity");
    assert_eq!(fidelities.len(), 3);
    assert!(fidelities.iter().all(|f| (0.0..=1.0 + 1e-9).contains(f)));

    let space = generate_hilbert_space::<TestAutodiffBackend>(2, &device).unwrap();
    let exact = outcome.state.exact_state(space);
    let trace: f64 = exact.probabilities().iter().sum();
    assert!((trace - 1.0).abs() < 1e-9);
}

#[test]
fn test_model_saver_snapshots_reload_bit_identical() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let (_, data) = w_state_data(2, &[Basis::computational(2), Basis::parse("XX").unwrap()], 30, 30);
    let mut rng = StdRng::seed_from_u64(31);
    let state = ComplexWavefunctionConfig::new(2, 3).init::<TestAutodiffBackend, _>(&mut rng, &device);

    let saver = ModelSaver::<TestAutodiffBackend>::new(1, tmp.path().join("snapshots"))
        .with_stem("complex")
        .with_save_initial(true);
    let initial_path = saver.path_for(0);
    let final_path = saver.path_for(2);

    let config = FitConfig::new().with_epochs(2).with_pos_batch_size(20).with_log_interval(0);
    let mut optimizer = SgdConfig::new().init::<TestAutodiffBackend, ComplexWavefunction<TestAutodiffBackend>>();
    let mut callbacks = CallbackList::new().with(saver);
    let outcome = fit(&config, state, &data, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    assert!(rbm::state::snapshot::config_path(&initial_path).exists());
    let restored = ComplexWavefunction::<TestAutodiffBackend>::load(&final_path, &device).unwrap();
    let space = generate_hilbert_space::<TestAutodiffBackend>(2, &device).unwrap();
    assert_eq!(
        tensor_to_vec(restored.effective_energy(space.clone())),
        tensor_to_vec(outcome.state.effective_energy(space.clone()))
    );
    let psi_restored = restored.exact_state(space.clone()).density_matrix();
    let psi_trained = outcome.state.exact_state(space).density_matrix();
    assert_eq!(psi_restored, psi_trained);

    let mut meta_name = final_path.into_os_string();
    meta_name.push(".meta.json");
    let meta: SnapshotMeta = serde_json::from_reader(std::fs::File::open(meta_name).unwrap()).unwrap();
    assert_eq!(meta.epoch, 2);
    assert_eq!(meta.kind, rbm::StateKind::Complex);
    assert!(meta.metrics.contains_key(OBJECTIVE_METRIC));
}

#[test]
fn test_early_stopping_halts_training_at_patience_epoch() {
    let device = Default::default();
    let (_, data) = w_state_data(2, &[Basis::computational(2)], 10, 40);
    let mut rng = StdRng::seed_from_u64(41);
    let state = PositiveWavefunctionConfig::new(2, 2).init::<TestAutodiffBackend, _>(&mut rng, &device);

    let scripted = [1.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5];
    let mut callbacks = CallbackList::new()
        .with(
            LambdaCallback::<PositiveWavefunction<TestAutodiffBackend>>::new().on_epoch_end(|_, epoch, history| {
                history.push("scripted", epoch, scripted[epoch - 1]);
                Ok(Signal::Continue)
            }),
        )
        .with(EarlyStopping::new(1, 1e-6, 3, "scripted").with_criterion(ChangeCriterion::Absolute));

    let config = FitConfig::new().with_epochs(8).with_pos_batch_size(10).with_log_interval(0);
    let mut optimizer = SgdConfig::new().init::<TestAutodiffBackend, PositiveWavefunction<TestAutodiffBackend>>();
    let outcome = fit(&config, state, &data, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    assert_eq!(outcome.epochs_completed, 5);
    assert!(outcome.stopped_early);
    assert_eq!(outcome.history.scalars(OBJECTIVE_METRIC).len(), 5);
}

#[test]
fn test_training_from_measurement_files() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let (target, data) = w_state_data(2, &adjacent_pair_bases(2), 20, 50);

    let samples_path = tmp.path().join("samples.txt");
    let bases_path = tmp.path().join("bases.txt");
    let mut writer = MeasurementWriter::new();
    writer.record_all(&data);
    writer.finish(&samples_path, &bases_path).unwrap();
    let loaded = MeasurementReader::read_training_set(&samples_path, &bases_path).unwrap();
    assert_eq!(loaded, data);

    let mut rng = StdRng::seed_from_u64(51);
    let state = ComplexWavefunctionConfig::new(2, 2).init::<TestAutodiffBackend, _>(&mut rng, &device);
    let ctx = MetricContext::<TestAutodiffBackend>::new(2, &device)
        .unwrap()
        .with_target(target)
        .with_data(loaded.clone());

    let config = FitConfig::new().with_epochs(2).with_pos_batch_size(25).with_log_interval(0);
    let mut optimizer = SgdConfig::new().init::<TestAutodiffBackend, ComplexWavefunction<TestAutodiffBackend>>();
    let mut callbacks = CallbackList::new().with(
        MetricEvaluator::<TestAutodiffBackend, ComplexWavefunction<TestAutodiffBackend>>::new(1, ctx)
            .with_metric("nll", metrics::negative_log_likelihood)
            .with_metric("norm", metrics::normalization)
            .with_observable("sz", rbm::Observable::SigmaZ { absolute: false }, 50, 2)
            .unwrap(),
    );
    let outcome = fit(&config, state, &loaded, &Unitaries::standard(), &mut optimizer, &mut callbacks).unwrap();

    let nll = outcome.history.scalars("nll");
    assert_eq!(nll.len(), 2);
    assert!(nll.iter().all(|x| x.is_finite() && *x > 0.0));
    assert!(outcome.history.scalars("norm").iter().all(|x| *x > 0.0));
    assert_eq!(outcome.history.scalars("sz_variance").len(), 2);

    let history_path = tmp.path().join("history.json");
    outcome.history.save_json(&history_path).unwrap();
    let restored: rbm::MetricHistory =
        serde_json::from_reader(std::fs::File::open(&history_path).unwrap()).unwrap();
    assert_eq!(restored.latest(), outcome.history.latest());
}
