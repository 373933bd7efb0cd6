use rayon::prelude::*;

use crate::error::FieldError;

/// Controls how independent work items (field chunks) are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool, one task per work item.
    #[default]
    Parallel,

    /// Run sequentially on the current thread.
    ///
    /// Useful for debugging, or when the query function keeps its own thread pool busy.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

/// Map every item through a fallible function and collect the results in item order.
///
/// The first error aborts the whole map; results of other items are discarded.
pub fn try_map_ordered<T, U, F>(
    items: &[T],
    strategy: ExecutionStrategy,
    op: F,
) -> Result<Vec<U>, FieldError>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U, FieldError> + Sync + Send,
{
    match strategy {
        ExecutionStrategy::Serial => items.iter().map(op).collect(),
        ExecutionStrategy::Parallel => items.par_iter().map(op).collect(),
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(FieldError::InvalidArgument(
                    "thread count must be > 0, got 0".to_string(),
                ));
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| FieldError::ThreadPool(e.to_string()))?;

            pool.install(|| items.par_iter().map(op).collect())
        }
    }
}
