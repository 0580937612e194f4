use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// How a run reports stage failures when more than one stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the first observed stage error, log and drop the rest.
    #[default]
    FirstError,
    /// Return every observed stage error as a single aggregated error.
    Aggregate,
}

/// Settings for a single conveyer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConveyerConfig {
    /// Capacity of every channel created by the conveyer.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Reporting strategy for stage failures.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl ConveyerConfig {
    /// Default channel capacity.
    pub const DEFAULT_BUFFER_SIZE: usize = 16;

    /// Validates conveyer configuration settings.
    ///
    /// Ensures `buffer_size` is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.buffer_size == 0 {
            return Err(ValidationError::BufferSizeZero);
        }

        Ok(())
    }
}

impl Default for ConveyerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

fn default_buffer_size() -> usize {
    ConveyerConfig::DEFAULT_BUFFER_SIZE
}
