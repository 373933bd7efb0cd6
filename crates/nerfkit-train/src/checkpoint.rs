use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};

use crate::context::{TrainingContext, TrainingStats};
use crate::error::TrainError;
use crate::model::{ParameterState, RadianceModel};

const CHECKPOINT_EXTENSION: &str = "ckpt";

/// Which checkpoint a trainer restores when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UseCheckpoint {
    /// Start from a freshly initialized model.
    Scratch,
    /// The most recent epoch checkpoint.
    #[default]
    Latest,
    /// The best checkpoint, or the latest one if no best checkpoint exists.
    Best,
    /// An explicit checkpoint file.
    Path(PathBuf),
}

impl From<String> for UseCheckpoint {
    fn from(value: String) -> Self {
        match value.as_str() {
            "scratch" => UseCheckpoint::Scratch,
            "latest" => UseCheckpoint::Latest,
            "best" => UseCheckpoint::Best,
            _ => UseCheckpoint::Path(PathBuf::from(value)),
        }
    }
}

impl From<UseCheckpoint> for String {
    fn from(value: UseCheckpoint) -> Self {
        match value {
            UseCheckpoint::Scratch => "scratch".to_string(),
            UseCheckpoint::Latest => "latest".to_string(),
            UseCheckpoint::Best => "best".to_string(),
            UseCheckpoint::Path(path) => path.display().to_string(),
        }
    }
}

/// A checkpoint record.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Checkpoint {
    /// The epoch at which the checkpoint was written.
    pub epoch: usize,
    /// The global step at which the checkpoint was written.
    pub global_step: usize,
    /// The training statistics.
    pub stats: TrainingStats,
    /// The model parameters.
    pub model: ParameterState,
    /// The optimizer state, present in full checkpoints.
    pub optimizer: Option<ParameterState>,
}

impl Checkpoint {
    /// Write the checkpoint to a file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TrainError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let config = bincode::config::standard();

        bincode::encode_into_std_write(self, &mut writer, config)
            .map_err(|e| TrainError::Checkpoint(e.to_string()))?;
        writer.flush()?;

        Ok(())
    }

    /// Read a checkpoint from a file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, TrainError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let config = bincode::config::standard();

        bincode::decode_from_std_read(&mut reader, config)
            .map_err(|e| TrainError::Checkpoint(e.to_string()))
    }
}

/// Writes, rotates and finds the checkpoints of one experiment.
///
/// Epoch checkpoints are named `<name>_ep<epoch:04>.ckpt`, the best checkpoint `<name>.ckpt`.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    name: String,
    max_keep: usize,
}

impl CheckpointManager {
    /// Create a manager writing into `dir`, creating the directory if needed.
    pub fn new(
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        max_keep: usize,
    ) -> Result<Self, TrainError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            name: name.into(),
            max_keep,
        })
    }

    /// The checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path of the checkpoint of `epoch`.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("{}_ep{epoch:04}.{CHECKPOINT_EXTENSION}", self.name))
    }

    /// The path of the best checkpoint.
    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{CHECKPOINT_EXTENSION}", self.name))
    }

    /// The lexicographically last epoch checkpoint in the directory.
    pub fn latest(&self) -> Result<Option<PathBuf>, TrainError> {
        let prefix = format!("{}_ep", self.name);
        let suffix = format!(".{CHECKPOINT_EXTENSION}");

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_epoch_checkpoint = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(&suffix));
            if is_epoch_checkpoint {
                candidates.push(path);
            }
        }
        candidates.sort();

        Ok(candidates.pop())
    }

    /// Save the model and the training state.
    ///
    /// A regular save writes the epoch checkpoint and deletes the oldest ones beyond
    /// `max_keep`. A `best` save overwrites the best checkpoint only when the latest
    /// evaluation result improves on the best one, and records the new best result.
    /// `full` adds the optimizer state.
    ///
    /// # Returns
    ///
    /// The written file, `None` if nothing was written.
    pub fn save<M: RadianceModel + ?Sized>(
        &self,
        ctx: &mut TrainingContext,
        model: &M,
        full: bool,
        best: bool,
    ) -> Result<Option<PathBuf>, TrainError> {
        let optimizer = if full { model.optimizer_state() } else { None };

        if !best {
            let path = self.epoch_path(ctx.epoch);
            // a resumed epoch overwrites its own checkpoint
            ctx.stats.checkpoints.retain(|p| p != &path);
            ctx.stats.checkpoints.push(path.clone());
            while ctx.stats.checkpoints.len() > self.max_keep {
                let old = ctx.stats.checkpoints.remove(0);
                if old.exists() {
                    std::fs::remove_file(&old)?;
                    log::debug!("removed old checkpoint {}", old.display());
                }
            }

            self.record(ctx, model, optimizer).write(&path)?;
            log::info!("saved checkpoint {}", path.display());
            return Ok(Some(path));
        }

        if ctx.stats.results.is_empty() {
            log::warn!("no evaluated results found, skip saving best checkpoint");
            return Ok(None);
        }

        let Some(result) = ctx.stats.improved_result() else {
            return Ok(None);
        };

        log::info!(
            "new best result: {:?} --> {result}",
            ctx.stats.best_result
        );
        ctx.stats.best_result = Some(result);

        let path = self.best_path();
        self.record(ctx, model, optimizer).write(&path)?;
        Ok(Some(path))
    }

    fn record<M: RadianceModel + ?Sized>(
        &self,
        ctx: &TrainingContext,
        model: &M,
        optimizer: Option<ParameterState>,
    ) -> Checkpoint {
        Checkpoint {
            epoch: ctx.epoch,
            global_step: ctx.global_step,
            stats: ctx.stats.clone(),
            model: model.state(),
            optimizer,
        }
    }

    /// Read a checkpoint, the latest epoch checkpoint when `path` is `None`.
    ///
    /// Returns `None`, with a warning, when no epoch checkpoint exists.
    pub fn load(&self, path: Option<&Path>) -> Result<Option<Checkpoint>, TrainError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match self.latest()? {
                Some(latest) => {
                    log::info!("latest checkpoint is {}", latest.display());
                    latest
                }
                None => {
                    log::warn!("no checkpoint found, model randomly initialized");
                    return Ok(None);
                }
            },
        };

        Checkpoint::read(path).map(Some)
    }
}
