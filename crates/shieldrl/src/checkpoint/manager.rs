//! Checkpoint manager: rotation and best-model tracking.

use super::state::Checkpointable;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_PREFIX: &str = "checkpoint_epoch_";
const CHECKPOINT_SUFFIX: &str = ".json";
const BEST_FILENAME: &str = "checkpoint_best.json";

/// Configuration for checkpoint management.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Directory to store checkpoints
    pub checkpoint_dir: PathBuf,
    /// Save a checkpoint every N epochs
    pub save_every: u64,
    /// Keep only the last N checkpoints (0 = keep all)
    pub keep_last: usize,
    /// Also track a "best" checkpoint by episode return
    pub save_best: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            save_every: 10,
            keep_last: 5,
            save_best: true,
        }
    }
}

impl CheckpointConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn save_every(mut self, epochs: u64) -> Self {
        self.save_every = epochs;
        self
    }

    pub fn keep_last(mut self, n: usize) -> Self {
        self.keep_last = n;
        self
    }

    pub fn save_best(mut self, enabled: bool) -> Self {
        self.save_best = enabled;
        self
    }
}

/// Manages checkpoint lifecycle: saving, loading, rotation, best tracking.
pub struct CheckpointManager {
    config: CheckpointConfig,
    best_return: f64,
}

impl CheckpointManager {
    pub fn new(config: CheckpointConfig) -> Self {
        if let Err(e) = fs::create_dir_all(&config.checkpoint_dir) {
            tracing::warn!("failed to create checkpoint directory: {}", e);
        }
        Self {
            config,
            best_return: f64::NEG_INFINITY,
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Save if the epoch matches the configured cadence. Returns the path to
    /// the new checkpoint when one was written.
    pub fn maybe_save<T: Checkpointable>(
        &mut self,
        trainable: &T,
        epoch: u64,
        mean_return: f64,
    ) -> Result<Option<PathBuf>> {
        if epoch == 0 || epoch % self.config.save_every != 0 {
            return Ok(None);
        }
        self.save(trainable, epoch, mean_return)
    }

    /// Force save a checkpoint regardless of epoch.
    pub fn save<T: Checkpointable>(
        &mut self,
        trainable: &T,
        epoch: u64,
        mean_return: f64,
    ) -> Result<Option<PathBuf>> {
        let data = trainable.save_state()?;
        let path = self
            .config
            .checkpoint_dir
            .join(format!("{}{:06}{}", CHECKPOINT_PREFIX, epoch, CHECKPOINT_SUFFIX));
        fs::write(&path, &data)?;
        tracing::info!(path = %path.display(), epoch, "saved checkpoint");

        if self.config.save_best && mean_return > self.best_return {
            self.best_return = mean_return;
            fs::copy(&path, self.config.checkpoint_dir.join(BEST_FILENAME))?;
            tracing::info!(mean_return, "new best checkpoint");
        }

        if self.config.keep_last > 0 {
            self.rotate()?;
        }

        Ok(Some(path))
    }

    /// Load the newest checkpoint, returning its epoch when one exists.
    pub fn load_latest<T: Checkpointable>(&self, trainable: &mut T) -> Result<Option<u64>> {
        match self.list_checkpoints()?.pop() {
            Some(path) => {
                let data = fs::read(&path)?;
                trainable.load_state(&data)?;
                let epoch = epoch_from_path(&path);
                tracing::info!(path = %path.display(), epoch, "loaded checkpoint");
                Ok(Some(epoch))
            }
            None => Ok(None),
        }
    }

    /// Load the best checkpoint if one exists.
    pub fn load_best<T: Checkpointable>(&self, trainable: &mut T) -> Result<bool> {
        let path = self.config.checkpoint_dir.join(BEST_FILENAME);
        if !path.exists() {
            return Ok(false);
        }
        let data = fs::read(&path)?;
        trainable.load_state(&data)?;
        tracing::info!("loaded best checkpoint");
        Ok(true)
    }

    /// All rotating checkpoint files, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(e) => e,
            Err(_) => return Ok(Vec::new()),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(CHECKPOINT_PREFIX) && n.ends_with(CHECKPOINT_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn rotate(&self) -> Result<()> {
        let mut paths = self.list_checkpoints()?;
        while paths.len() > self.config.keep_last {
            let old = paths.remove(0);
            if let Err(e) = fs::remove_file(&old) {
                tracing::warn!(path = %old.display(), "failed to remove old checkpoint: {}", e);
            }
        }
        Ok(())
    }
}

fn epoch_from_path(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(CHECKPOINT_PREFIX))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
