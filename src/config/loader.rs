//! Configuration Loader
//!
//! Environment-aware loading of `strata-config.yaml`. The base document is
//! deep-merged with the section named after the active environment
//! (`development`, `test` or `production`), then the environment sections are
//! dropped and the result is deserialized into [`StrataConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::StrataConfig;
use crate::constants::{environments, CONFIG_FILE_NAMES, ENVIRONMENT_VARIABLES};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: StrataConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load from a directory, detecting the environment from `STRATA_ENV` / `APP_ENV`
    pub fn load_from_directory(config_directory: &Path) -> ConfigResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_directory, &environment)
    }

    /// Load from a directory with an explicit environment.
    ///
    /// Useful in tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<Self> {
        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading data layer configuration"
        );

        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file(&config_file)?;
        let config = Self::parse_and_merge(
            &yaml_content,
            environment,
            &config_file.display().to_string(),
        )?;

        config.validate()?;

        info!(
            environment = environment,
            file = %config_file.display(),
            cache_bounded = config.cache.is_bounded(),
            breakers_enabled = config.circuit_breakers.enabled,
            "⚙️ Configuration loaded"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            source_path: Some(config_file),
        })
    }

    /// Load from an in-memory YAML document
    pub fn load_from_str(yaml_content: &str, environment: &str) -> ConfigResult<Self> {
        let config = Self::parse_and_merge(yaml_content, environment, "<inline>")?;
        config.validate()?;

        Ok(Self {
            config,
            environment: environment.to_string(),
            source_path: None,
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn into_config(self) -> StrataConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from (`None` for inline documents)
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Detect current environment from environment variables, defaulting to development
    pub fn detect_environment() -> String {
        ENVIRONMENT_VARIABLES
            .iter()
            .find_map(|name| env::var(name).ok())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| environments::DEVELOPMENT.to_string())
            .to_lowercase()
    }

    /// Find the configuration file
    pub fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn read_config_file(path: &Path) -> ConfigResult<String> {
        let file_read_error = |reason: String| ConfigurationError::FileRead {
            path: path.display().to_string(),
            reason,
        };

        let metadata = std::fs::metadata(path).map_err(|e| file_read_error(e.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(file_read_error(format!(
                "configuration file too large ({} bytes > {MAX_CONFIG_FILE_SIZE} byte limit)",
                metadata.len()
            )));
        }

        std::fs::read_to_string(path).map_err(|e| file_read_error(e.to_string()))
    }

    fn parse_and_merge(
        yaml_content: &str,
        environment: &str,
        source: &str,
    ) -> ConfigResult<StrataConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source, e))?;

        // An empty document deserializes as null; treat it as "all defaults"
        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                environment = environment,
                "Applying environment-specific overrides"
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for name in environments::ALL {
                map.remove(YamlValue::String(name.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source,
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    pub fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}
