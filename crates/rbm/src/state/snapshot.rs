//! Parameter snapshots: a named MessagePack record plus the state's config
//! as JSON next to it.
//!
//! `save(state, "runs/a/final")` writes `runs/a/final.mpk` and
//! `runs/a/final.config.json`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{DoublePrecisionSettings, NamedMpkFileRecorder};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::state::NeuralState;

pub fn recorder() -> NamedMpkFileRecorder<DoublePrecisionSettings> {
    NamedMpkFileRecorder::<DoublePrecisionSettings>::new()
}

/// Path of the config file stored alongside a snapshot.
pub fn config_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".config.json");
    PathBuf::from(name)
}

pub fn save<B: Backend, S: NeuralState<B>>(state: &S, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let config_file = config_path(path);
    state
        .config()
        .save(&config_file)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", config_file.display()))?;
    state
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| anyhow::anyhow!("Failed to save {} state to {}: {e}", state.kind(), path.display()))?;
    tracing::debug!(kind = %state.kind(), path = %path.display(), "Saved snapshot");
    Ok(())
}

/// Rebuild a state from its config, then load the saved parameters on top.
pub fn load<B: Backend, S: NeuralState<B>>(path: &Path, device: &B::Device) -> anyhow::Result<S> {
    let config_file = config_path(path);
    let config = <S::Config as Config>::load(&config_file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", config_file.display()))?;
    // Initial values are overwritten by the record.
    let mut rng = StdRng::seed_from_u64(0);
    let state = S::from_config(&config, &mut rng, device)
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| anyhow::anyhow!("Failed to load snapshot from {}: {e}", path.display()))?;
    Ok(state)
}
