//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML file discovery, environment
//! detection, override merging and deployment variable overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::GatewatchConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 2] = ["gatewatch.yaml", "gatewatch.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration together with the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: GatewatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_lookup(config_dir, environment, |name| env::var(name).ok())
    }

    /// Load configuration resolving deployment overrides through `lookup`
    pub fn load_with_lookup<F>(
        config_dir: Option<PathBuf>,
        environment: &str,
        lookup: F,
    ) -> ConfigResult<Arc<ConfigManager>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::apply_env_overrides(&mut config, lookup);
        config.validate()?;

        Ok(Arc::new(Self::finish(config, environment, config_directory)))
    }

    /// Load configuration, falling back to built-in defaults when no file exists.
    ///
    /// Any other failure (bad YAML, failed validation) is still returned.
    pub fn load_or_default() -> ConfigResult<Arc<ConfigManager>> {
        match Self::load() {
            Ok(manager) => Ok(manager),
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "No configuration file found, using built-in defaults");
                let mut config = GatewatchConfig::default();
                Self::apply_env_overrides(&mut config, |name| env::var(name).ok());
                config.validate()?;
                Ok(Arc::new(Self::finish(
                    config,
                    &Self::detect_environment(),
                    Self::default_config_directory(),
                )))
            }
            Err(e) => Err(e),
        }
    }

    fn finish(
        config: GatewatchConfig,
        environment: &str,
        config_directory: PathBuf,
    ) -> ConfigManager {
        let sanitized = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            lock_ttl_seconds = config.lock.ttl_seconds,
            heartbeat_interval_seconds = config.lock.heartbeat_interval_seconds,
            dashboard_url = %config.dashboard.url,
            "Configuration loaded"
        );

        ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GatewatchConfig {
        &self.config
    }

    /// Get the resolved environment name
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Get sanitized configuration for debugging/logging that masks credentials
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Apply deployment overrides from the process environment.
    ///
    /// `lookup` abstracts `std::env::var` so tests can supply values without
    /// touching global state.
    pub fn apply_env_overrides<F>(config: &mut GatewatchConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            debug!("Overriding database.url from DATABASE_URL");
            config.database.url = url;
        }

        let dashboard = lookup("DASHBOARD_URL")
            .or_else(|| lookup("APP_URL"))
            .filter(|v| !v.trim().is_empty());
        if let Some(url) = dashboard {
            debug!(dashboard_url = %url, "Overriding dashboard.url from environment");
            config.dashboard.url = url;
        }
    }

    fn detect_environment() -> String {
        env::var("GATEWATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("GATEWATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Safely read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1MB limit

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file larger than {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<GatewatchConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }

    fn sanitize_config_for_logging(config: &GatewatchConfig) -> serde_json::Value {
        let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        if let Some(url) = value.pointer_mut("/database/url") {
            if let Some(raw) = url.as_str() {
                *url = serde_json::Value::String(mask_url_password(raw));
            }
        }
        value
    }
}

/// Replace the password component of a connection URL with `***`
pub fn mask_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_ok() {
                parsed.to_string()
            } else {
                "[MASKED]".to_string()
            }
        }
        Ok(_) => raw.to_string(),
        Err(_) => "[MASKED]".to_string(),
    }
}
