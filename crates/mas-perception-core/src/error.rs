use mas_perception_msgs::MsgError;

/// Errors returned by the perception routines.
///
/// Every failure aborts the call; no routine returns partial results.
#[derive(thiserror::Error, Debug)]
pub enum PerceptionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("deserialization failed: {0}")]
    Deserialization(#[from] MsgError),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("transformation is not a 4x4 matrix (got {rows}x{cols})")]
    DimensionMismatch { rows: usize, cols: usize },
}

impl PerceptionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange(message.into())
    }
}
