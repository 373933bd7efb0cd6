#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Checkpoint records, retention and loading.
pub mod checkpoint;

/// Trainer configuration.
pub mod config;

/// Training state carried between epochs.
pub mod context;

/// Posed frames and batches.
pub mod data;

/// Error types for the training module.
pub mod error;

/// Image losses and metrics.
pub mod metrics;

/// The radiance model capability.
pub mod model;

/// Render options derived from the training schedule.
pub mod options;

/// Cross-process reduction of scalar statistics.
pub mod reduce;

/// The training loop.
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointManager, UseCheckpoint};
pub use config::{BestMode, TrainerConfig};
pub use context::{TrainingContext, TrainingStats};
pub use data::Frame;
pub use error::TrainError;
pub use metrics::{l1, mse, psnr, psnr_from_mse, Criterion, LossBreakdown, PsnrMeter};
pub use model::{ModelError, ParameterState, RadianceModel, RenderOutput};
pub use options::RenderOptions;
pub use reduce::{Reducer, SingleProcess};
pub use trainer::{EvalSummary, MeshExportOptions, Prediction, RenderedView, Trainer};
