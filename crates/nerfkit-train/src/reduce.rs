/// Reduction of scalar statistics across the processes of a data-parallel run.
///
/// Only rank 0 logs metrics and writes files.
pub trait Reducer {
    /// The index of this process.
    fn rank(&self) -> usize;

    /// The number of processes.
    fn world_size(&self) -> usize;

    /// Average a value over all processes.
    fn all_reduce_mean(&self, value: f64) -> f64;

    /// Check if this process owns logging and file output.
    fn is_main(&self) -> bool {
        self.rank() == 0
    }
}

/// A single process run, where every reduction is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Reducer for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_mean(&self, value: f64) -> f64 {
        value
    }
}
