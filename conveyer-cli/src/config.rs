use conveyer_config::shared::CliConfig;
use conveyer_config::{LoadConfigError, load_config};
use tracing::info;

use crate::error::{CliError, CliResult};

/// Loads the command line configuration, applies flag overrides and validates the result.
///
/// Falls back to [`CliConfig::default`] when there is no `configuration` directory next to the
/// working directory, so the binary runs without any files on disk.
pub fn load_cli_config(
    buffer_size: Option<usize>,
    separator_outputs: Option<usize>,
) -> CliResult<CliConfig> {
    let mut config = match load_config::<CliConfig>() {
        Ok(config) => config,
        Err(LoadConfigError::MissingConfigurationDirectory(path)) => {
            info!(path = %path.display(), "no configuration directory, using defaults");
            CliConfig::default()
        }
        Err(err) => return Err(CliError::config(err)),
    };

    if let Some(buffer_size) = buffer_size {
        config.conveyer.buffer_size = buffer_size;
    }
    if let Some(separator_outputs) = separator_outputs {
        config.separator_outputs = separator_outputs;
    }

    config.validate().map_err(CliError::config)?;

    Ok(config)
}
