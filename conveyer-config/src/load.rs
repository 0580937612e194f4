//! Layered configuration loading.
//!
//! A configuration directory holds a `base` file and one file per [`Environment`], each in YAML
//! or JSON. The environment file is applied on top of the base file, and `APP_`-prefixed
//! environment variables are applied last, with `__` separating nested keys
//! (`APP_CONVEYER__BUFFER_SIZE=64`).

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory searched by [`load_config`], relative to the current directory.
const CONFIGURATION_DIR: &str = "configuration";

/// File stem of the layer shared by every environment.
const BASE_STEM: &str = "base";

/// Extensions tried in order for every layer.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_KEY_SEPARATOR: &str = "__";

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("no `{stem}.yaml`, `{stem}.yml` or `{stem}.json` in `{directory}`")]
    MissingLayer {
        stem: &'static str,
        directory: PathBuf,
    },

    #[error("`{path}` is not a valid configuration file: {source}")]
    InvalidLayer {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to merge configuration layers: {0}")]
    Merge(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads a configuration from the `configuration` directory of the current directory.
pub fn load_config<T: DeserializeOwned>() -> Result<T, LoadConfigError> {
    let current_dir = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;

    load_config_from(&current_dir.join(CONFIGURATION_DIR))
}

/// Loads a configuration from `directory`.
///
/// The environment layer is picked by `APP_ENVIRONMENT` (see [`Environment::load`]). Both the base
/// and the environment layer must exist.
pub fn load_config_from<T: DeserializeOwned>(directory: &Path) -> Result<T, LoadConfigError> {
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let environment = Environment::load().map_err(LoadConfigError::Environment)?;
    let base = read_layer(directory, BASE_STEM)?;
    let overrides = read_layer(directory, environment.as_str())?;

    let variables = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_KEY_SEPARATOR)
        .try_parsing(true);

    config::Config::builder()
        .add_source(base)
        .add_source(overrides)
        .add_source(variables)
        .build()
        .map_err(LoadConfigError::Merge)?
        .try_deserialize()
        .map_err(LoadConfigError::Deserialization)
}

/// Parses the first `{stem}.{extension}` file found in `directory` on its own, so that a syntax
/// error is reported against the file that contains it.
fn read_layer(directory: &Path, stem: &'static str) -> Result<config::Config, LoadConfigError> {
    let Some(path) = EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
    else {
        return Err(LoadConfigError::MissingLayer {
            stem,
            directory: directory.to_path_buf(),
        });
    };

    config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .build()
        .map_err(|source| LoadConfigError::InvalidLayer { path, source })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::shared::{CliConfig, ErrorPolicy};

    static NEXT_DIRECTORY: AtomicUsize = AtomicUsize::new(0);

    fn configuration_directory(files: &[(&str, &str)]) -> PathBuf {
        let directory = std::env::temp_dir().join(format!(
            "conveyer-config-{}-{}",
            std::process::id(),
            NEXT_DIRECTORY.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&directory).unwrap();

        for (name, content) in files {
            fs::write(directory.join(name), content).unwrap();
        }

        directory
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let directory = configuration_directory(&[
            (
                "base.yaml",
                "conveyer:\n  buffer_size: 8\n  error_policy: aggregate\nseparator_outputs: 3\n",
            ),
            ("dev.yaml", "conveyer:\n  buffer_size: 32\n"),
            ("prod.yaml", "conveyer:\n  buffer_size: 64\n"),
        ]);

        let config: CliConfig = load_config_from(&directory).unwrap();
        let expected_buffer_size = match Environment::load().unwrap() {
            Environment::Dev => 32,
            Environment::Prod => 64,
        };

        assert_eq!(config.conveyer.buffer_size, expected_buffer_size);
        assert_eq!(config.conveyer.error_policy, ErrorPolicy::Aggregate);
        assert_eq!(config.separator_outputs, 3);

        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn missing_directory_is_reported() {
        let directory = std::env::temp_dir().join("conveyer-config-does-not-exist");

        let err = load_config_from::<CliConfig>(&directory).unwrap_err();
        assert!(matches!(
            err,
            LoadConfigError::MissingConfigurationDirectory(path) if path == directory
        ));
    }

    #[test]
    fn missing_environment_file_is_reported() {
        let directory = configuration_directory(&[("base.json", "{}")]);

        let err = load_config_from::<CliConfig>(&directory).unwrap_err();
        let environment = Environment::load().unwrap();
        assert!(matches!(
            err,
            LoadConfigError::MissingLayer { stem, .. } if stem == environment.as_str()
        ));

        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn syntax_errors_name_the_broken_file() {
        let directory = configuration_directory(&[
            ("base.yml", "conveyer: [unclosed\n"),
            ("dev.json", "{}"),
            ("prod.json", "{}"),
        ]);

        let err = load_config_from::<CliConfig>(&directory).unwrap_err();
        assert!(matches!(
            err,
            LoadConfigError::InvalidLayer { ref path, .. } if path.ends_with("base.yml")
        ));

        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let directory = configuration_directory(&[
            ("base.json", "{}"),
            ("dev.json", "{}"),
            ("prod.json", "{}"),
        ]);

        let config: CliConfig = load_config_from(&directory).unwrap();
        assert_eq!(config, CliConfig::default());

        fs::remove_dir_all(directory).unwrap();
    }
}
