/// An error type for the rays module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RayError {
    /// The batch dimensions of two inputs do not match.
    #[error("Batch size mismatch: {0} poses but {1} intrinsics")]
    InvalidShape(usize, usize),

    /// A buffer does not have the expected length.
    #[error("Data length ({0}) does not match the expected size ({1})")]
    InvalidDataLength(usize, usize),

    /// An argument is outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The sampling request cannot produce any ray.
    #[error("Invalid ray request: {0}")]
    InvalidRequest(String),
}
