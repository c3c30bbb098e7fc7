//! Result types written at the end of a training run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use rbm::training::MetricValue;
use rbm::StateKind;
use serde::{Deserialize, Serialize};

/// Outcome of one `train` invocation, written as `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    /// Job-array index, when launched with `--run-index`.
    pub run_index: Option<u64>,
    pub kind: StateKind,
    pub num_sites: usize,
    pub num_hidden: usize,
    /// Auxiliary units (density matrices only).
    pub num_aux: Option<usize>,
    pub num_samples: usize,
    pub seed: u64,
    pub epochs_completed: usize,
    pub stopped_early: bool,
    /// Wall-clock training time in seconds.
    pub elapsed_secs: f64,
    /// Latest value of every recorded metric.
    pub final_metrics: BTreeMap<String, MetricValue>,
    /// Path of the final snapshot, without extension.
    pub snapshot: String,
}

impl TrainSummary {
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Human-readable report printed after training.
    pub fn print(&self) {
        println!("\n--- Training Summary ---");
        if let Some(index) = self.run_index {
            println!("Run index: {index}");
        }
        println!("State: {} ({} sites, {} hidden)", self.kind, self.num_sites, self.num_hidden);
        println!("Samples: {}", self.num_samples);
        println!(
            "Epochs: {}{}",
            self.epochs_completed,
            if self.stopped_early { " (stopped early)" } else { "" }
        );
        for (name, value) in &self.final_metrics {
            println!("{name}: {value}");
        }
        println!("Snapshot: {}", self.snapshot);
        println!("Elapsed: {:.1}s", self.elapsed_secs);
    }
}

/// Directory of one run: `<output_dir>/run_<index>` for array jobs.
pub fn run_dir(output_dir: &Path, run_index: Option<u64>) -> std::path::PathBuf {
    match run_index {
        Some(index) => output_dir.join(format!("run_{index}")),
        None => output_dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summary_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.json");
        let mut final_metrics = BTreeMap::new();
        final_metrics.insert("fidelity".to_string(), MetricValue::Scalar(0.93));
        let summary = TrainSummary {
            run_index: Some(3),
            kind: StateKind::Density,
            num_sites: 2,
            num_hidden: 2,
            num_aux: Some(2),
            num_samples: 500,
            seed: 10,
            epochs_completed: 40,
            stopped_early: true,
            elapsed_secs: 1.5,
            final_metrics,
            snapshot: "runs/run_3/final".to_string(),
        };
        summary.save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"kind\": \"density\""));
        let loaded = TrainSummary::load(&path).unwrap();
        assert_eq!(loaded.final_metrics, summary.final_metrics);
        assert_eq!(loaded.run_index, Some(3));
    }

    #[test]
    fn test_run_dir() {
        let base = Path::new("out");
        assert_eq!(run_dir(base, None), Path::new("out"));
        assert_eq!(run_dir(base, Some(2)), Path::new("out/run_2"));
    }
}
