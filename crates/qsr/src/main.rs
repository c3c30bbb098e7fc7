mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rbm::StateKind;
use tracing_subscriber::EnvFilter;

use pipeline::{BasisSet, GenerateArgs, SampleArgs, SummaryArgs, SyntheticState, TrainArgs};

/// qsr: quantum state reconstruction with restricted Boltzmann machines.
#[derive(Parser)]
#[command(name = "qsr", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, data generation, inspection and sampling.
#[derive(Subcommand)]
enum Command {
    /// Train one NN-state on measurement data.
    Train {
        /// Path to train config TOML file. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Measurement outcomes, one 0/1 row per shot.
        #[arg(long)]
        samples: PathBuf,
        /// Basis of each shot, one per line.
        #[arg(long)]
        bases: PathBuf,
        /// Exact target amplitudes (`re im` per line), or the real part of a
        /// target density matrix together with --target-imag.
        #[arg(long)]
        target: Option<PathBuf>,
        /// Imaginary part of a target density matrix.
        #[arg(long, requires = "target")]
        target_imag: Option<PathBuf>,
        /// Bases used for KL evaluation. Defaults to the bases in the data.
        #[arg(long)]
        basis_list: Option<PathBuf>,
        /// Directory for the snapshot, history and summary.
        #[arg(long, default_value = "runs/qsr")]
        output_dir: PathBuf,
        /// Array job index: offsets the seed and writes to `run_<index>/`.
        #[arg(long)]
        run_index: Option<u64>,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the state kind (positive, complex, density).
        #[arg(long)]
        kind: Option<StateKind>,
    },
    /// Sample measurement data from a W or GHZ state.
    Generate {
        #[arg(long, value_enum, default_value_t = SyntheticState::W)]
        state: SyntheticState,
        /// Number of qubits.
        #[arg(long)]
        sites: usize,
        #[arg(long, value_enum, default_value_t = BasisSet::Pairs)]
        bases: BasisSet,
        /// Shots per basis.
        #[arg(long, default_value_t = 100)]
        shots: usize,
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Print statistics of a measurement dataset.
    Summary {
        #[arg(long)]
        samples: PathBuf,
        #[arg(long)]
        bases: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Draw computational-basis samples from a saved snapshot.
    Sample {
        /// Snapshot path without extension (e.g. runs/qsr/final).
        #[arg(long)]
        checkpoint: PathBuf,
        #[arg(long)]
        kind: StateKind,
        #[arg(long, default_value_t = 1000)]
        num_samples: usize,
        /// Gibbs steps per chain.
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// Output sample file; bases go to `<stem>.bases.txt` next to it.
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            samples,
            bases,
            target,
            target_imag,
            basis_list,
            output_dir,
            run_index,
            epochs,
            seed,
            kind,
        } => pipeline::run_train(TrainArgs {
            config,
            samples,
            bases,
            target,
            target_imag,
            basis_list,
            output_dir,
            run_index,
            epochs,
            seed,
            kind,
        }),
        Command::Generate {
            state,
            sites,
            bases,
            shots,
            output_dir,
            seed,
        } => pipeline::run_generate(GenerateArgs {
            state,
            sites,
            bases,
            shots,
            output_dir,
            seed,
        }),
        Command::Summary { samples, bases, json } => pipeline::run_summary(SummaryArgs { samples, bases, json }),
        Command::Sample {
            checkpoint,
            kind,
            num_samples,
            k,
            output,
            seed,
        } => pipeline::run_sample(SampleArgs {
            checkpoint,
            kind,
            num_samples,
            k,
            output,
            seed,
        }),
    }
}
