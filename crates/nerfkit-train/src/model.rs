use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use nerfkit_rays::RayBatch;

use crate::metrics::LossBreakdown;
use crate::options::RenderOptions;

/// An error reported by a [`RadianceModel`].
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// Rendering a ray bundle failed.
    #[error("Render failed: {0}")]
    Render(String),

    /// Evaluating the density field failed.
    #[error("Density query failed: {0}")]
    Density(String),

    /// The parameter update failed.
    #[error("Optimizer step failed: {0}")]
    Optimize(String),

    /// A parameter state does not fit the model.
    #[error("Incompatible parameter state: {0}")]
    State(String),
}

/// Named flat parameter buffers, as stored in checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct ParameterState {
    /// Parameter name to values.
    pub entries: BTreeMap<String, Vec<f32>>,
}

impl ParameterState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.entries.insert(name.into(), values);
    }

    /// Get an entry by name.
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.entries.get(name).map(|v| v.as_slice())
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the state has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The per-ray output of [`RadianceModel::render`].
///
/// Every buffer holds one entry per ray, concatenated over the batch elements in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    /// Rendered colors.
    pub rgb: Vec<[f32; 3]>,
    /// Rendered depths.
    pub depth: Vec<f32>,
    /// Rendered normals in `[-1, 1]`, if the model produces them.
    pub normal: Option<Vec<[f32; 3]>>,
    /// Eikonal regularization term, if any.
    pub gradient_error: Option<f64>,
    /// Curvature regularization term, if any.
    pub curvature_error: Option<f64>,
}

/// A differentiable volumetric renderer driven by the trainer.
///
/// Gradients and the optimizer live inside the implementation: the trainer hands over the
/// loss of the last [`render`](Self::render) call and asks the model to take a step.
pub trait RadianceModel {
    /// Render one color (and depth) per ray.
    fn render(
        &mut self,
        rays: &[RayBatch],
        options: &RenderOptions,
    ) -> Result<RenderOutput, ModelError>;

    /// Evaluate the density (or signed distance) at world points, one value per point.
    fn density(&self, points: &[[f64; 3]]) -> Result<Vec<f32>, ModelError>;

    /// Back-propagate the loss of the last render and update the parameters.
    fn backward_step(&mut self, loss: &LossBreakdown) -> Result<(), ModelError>;

    /// The current learning rate.
    fn learning_rate(&self) -> f64;

    /// Called once at the end of every training epoch, e.g. to step a scheduler.
    fn end_epoch(&mut self, _epoch: usize) {}

    /// Snapshot the model parameters.
    fn state(&self) -> ParameterState;

    /// Restore the model parameters.
    fn load_state(&mut self, state: &ParameterState) -> Result<(), ModelError>;

    /// Snapshot the optimizer state, stored in full checkpoints only.
    fn optimizer_state(&self) -> Option<ParameterState> {
        None
    }

    /// Restore the optimizer state.
    fn load_optimizer_state(&mut self, _state: &ParameterState) -> Result<(), ModelError> {
        Ok(())
    }
}
