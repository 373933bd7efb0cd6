use std::path::PathBuf;

use bincode::{Decode, Encode};

/// Running statistics of a training session, persisted in checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct TrainingStats {
    /// Average training loss of every epoch.
    pub loss: Vec<f64>,
    /// Average validation loss of every evaluation.
    pub valid_loss: Vec<f64>,
    /// Model selection score of every evaluation, lower is better.
    pub results: Vec<f64>,
    /// Epoch checkpoints currently on disk, oldest first.
    pub checkpoints: Vec<PathBuf>,
    /// The best score seen so far.
    pub best_result: Option<f64>,
}

impl TrainingStats {
    /// The latest evaluation score, if it beats the best one.
    pub fn improved_result(&self) -> Option<f64> {
        let latest = *self.results.last()?;
        match self.best_result {
            Some(best) if latest >= best => None,
            _ => Some(latest),
        }
    }
}

/// Counters and statistics of a training session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingContext {
    /// The current epoch, starting at 1.
    pub epoch: usize,
    /// Training steps taken over all epochs.
    pub global_step: usize,
    /// Steps taken in the current epoch or evaluation pass.
    pub local_step: usize,
    /// Running statistics.
    pub stats: TrainingStats,
}

impl Default for TrainingContext {
    fn default() -> Self {
        Self {
            epoch: 1,
            global_step: 0,
            local_step: 0,
            stats: TrainingStats::default(),
        }
    }
}
