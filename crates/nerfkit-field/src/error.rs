/// The error type returned by a field query.
pub type QueryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error type for the field module.
#[derive(thiserror::Error, Debug)]
pub enum FieldError {
    /// An argument is outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The query returned a different number of values than points.
    #[error("Query returned {0} values for {1} points")]
    InvalidShape(usize, usize),

    /// The query function failed; no partial field is produced.
    #[error("Field query failed: {0}")]
    Query(#[source] QueryError),

    /// The thread pool failed to build.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}
