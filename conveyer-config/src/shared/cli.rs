use serde::{Deserialize, Serialize};

use crate::shared::{ConveyerConfig, ValidationError};

/// Configuration of the `conveyer` command line demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CliConfig {
    /// Settings of the conveyer driven by the command line.
    #[serde(default)]
    pub conveyer: ConveyerConfig,
    /// Number of channels the separator stage fans values out to.
    #[serde(default = "default_separator_outputs")]
    pub separator_outputs: usize,
}

impl CliConfig {
    /// Default number of separator outputs.
    pub const DEFAULT_SEPARATOR_OUTPUTS: usize = 2;

    /// Validates the command line configuration and the nested conveyer settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.conveyer.validate()?;

        if self.separator_outputs == 0 {
            return Err(ValidationError::SeparatorOutputsZero);
        }

        Ok(())
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            conveyer: ConveyerConfig::default(),
            separator_outputs: default_separator_outputs(),
        }
    }
}

fn default_separator_outputs() -> usize {
    CliConfig::DEFAULT_SEPARATOR_OUTPUTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_separator_outputs_is_rejected() {
        let config: CliConfig = serde_json::from_str(r#"{"separator_outputs": 0}"#).unwrap();

        assert_eq!(config.validate(), Err(ValidationError::SeparatorOutputsZero));
    }

    #[test]
    fn nested_conveyer_settings_are_validated() {
        let config: CliConfig =
            serde_json::from_str(r#"{"conveyer": {"buffer_size": 0}}"#).unwrap();

        assert_eq!(config.separator_outputs, CliConfig::DEFAULT_SEPARATOR_OUTPUTS);
        assert_eq!(config.validate(), Err(ValidationError::BufferSizeZero));
    }
}
