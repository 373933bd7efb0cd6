use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::UseCheckpoint;
use crate::error::TrainError;
use crate::metrics::Criterion;

/// Whether a smaller or a larger evaluation metric is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BestMode {
    /// Smaller is better.
    #[default]
    Min,
    /// Larger is better.
    Max,
}

/// The trainer configuration.
///
/// Example:
///
/// ```
/// use nerfkit_train::{BestMode, TrainerConfig};
///
/// let config: TrainerConfig = serde_json::from_str(
///     r#"{ "name": "lego", "num_rays": 1024, "best_mode": "max", "use_loss_as_metric": false }"#,
/// )
/// .unwrap();
/// assert_eq!(config.name, "lego");
/// assert_eq!(config.max_keep_ckpt, 2);
/// assert_eq!(config.best_mode(), BestMode::Max);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// The experiment name, used in checkpoint and mesh file names.
    pub name: String,
    /// The directory holding checkpoints and meshes.
    pub workspace: PathBuf,
    /// Rays sampled per frame in a training step, `<= 0` renders every pixel.
    pub num_rays: i64,
    /// Evaluate every `eval_interval` epochs.
    pub eval_interval: usize,
    /// The number of epoch checkpoints kept on disk.
    pub max_keep_ckpt: usize,
    /// Whether a smaller or a larger metric is better.
    pub best_mode: BestMode,
    /// Select the best model by validation loss instead of PSNR.
    pub use_loss_as_metric: bool,
    /// The checkpoint restored at construction.
    pub use_checkpoint: UseCheckpoint,
    /// Composite training targets over white instead of a random color.
    pub white_background: bool,
    /// The photometric criterion.
    pub criterion: Criterion,
    /// Seed of the ray sampling and background rng.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            name: "nerf".to_string(),
            workspace: PathBuf::from("workspace"),
            num_rays: 4096,
            eval_interval: 1,
            max_keep_ckpt: 2,
            best_mode: BestMode::Min,
            use_loss_as_metric: true,
            use_checkpoint: UseCheckpoint::Latest,
            white_background: true,
            criterion: Criterion::Mse,
            seed: 0,
        }
    }
}

impl TrainerConfig {
    /// Read a configuration from a JSON file. Missing keys take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrainError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), TrainError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Check the value ranges.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.name.is_empty() {
            return Err(TrainError::InvalidConfig("name must not be empty".to_string()));
        }
        if self.eval_interval == 0 {
            return Err(TrainError::InvalidConfig(
                "eval_interval must be > 0".to_string(),
            ));
        }
        if self.max_keep_ckpt == 0 {
            return Err(TrainError::InvalidConfig(
                "max_keep_ckpt must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective best mode: selecting by loss always means smaller is better.
    pub fn best_mode(&self) -> BestMode {
        if self.use_loss_as_metric {
            BestMode::Min
        } else {
            self.best_mode
        }
    }

    /// The checkpoint directory inside the workspace.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.workspace.join("checkpoints")
    }
}
