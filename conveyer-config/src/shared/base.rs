use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Channels must buffer at least one value.
    #[error("`buffer_size` cannot be zero")]
    BufferSizeZero,
    /// A separator needs at least one output channel to distribute values to.
    #[error("`separator_outputs` cannot be zero")]
    SeparatorOutputsZero,
}
