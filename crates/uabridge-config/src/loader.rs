// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse into [`BridgeConfig`]
//! 4. Apply `UABRIDGE_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UABRIDGE_SERVER_PORT=4841
//! UABRIDGE_LOG_LEVEL=debug
//! UABRIDGE_DISPATCH_UNRESOLVED=abort
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{BridgeConfig, LogLevel};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "UABRIDGE";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use uabridge_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("uabridge.yaml").unwrap();
/// println!("port = {}", config.server.port);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable handling.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let format = ConfigFormat::from_path(path)?;
        let content = self.read_file(path)?;

        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let config = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        let config = self.finish(config)?;
        debug!(port = config.server.port, "Configuration loaded");
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
        let config = if self.resolve_env_vars {
            parse_str(&self.resolve_env_placeholders(content), format)?
        } else {
            parse_str(content, format)?
        };
        self.finish(config)
    }

    fn finish(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports `${VAR_NAME}` and `${VAR_NAME:default}`. Unknown variables
    /// without a default are kept verbatim.
    pub fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut body = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                body.push(c);
            }

            if !closed {
                result.push_str("${");
                result.push_str(&body);
                continue;
            }

            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body.as_str(), None),
            };

            match (env::var(name), default) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!("Environment variable '{}' not found", name);
                    result.push_str(&format!("${{{}}}", name));
                }
            }
        }

        result
    }

    fn env_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    fn apply_env_overrides(&self, config: &mut BridgeConfig) -> ConfigResult<()> {
        let name = self.env_name("SERVER_PORT");
        if let Ok(value) = env::var(&name) {
            config.server.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(&name, "expected a port number"))?;
            debug!(port = config.server.port, "Server port overridden from {}", name);
        }

        let name = self.env_name("LOG_LEVEL");
        if let Ok(value) = env::var(&name) {
            match LogLevel::parse(&value) {
                Some(level) => config.logging.level = level,
                None => warn!("Ignoring unknown log level '{}' in {}", value, name),
            }
        }

        let name = self.env_name("DISPATCH_UNRESOLVED");
        if let Ok(value) = env::var(&name) {
            config.dispatch.unresolved = value
                .parse()
                .map_err(|e: String| ConfigError::invalid_env_var(&name, e))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use uabridge_core::UnresolvedPolicy;

    const YAML: &str = r#"
server:
  port: 4841
  application_name: bridge-under-test

bus:
  temperature:
    change_threshold: 0.5

dispatch:
  unresolved: abort

logging:
  level: debug
  format: json
"#;

    fn isolated() -> ConfigLoader {
        // Prefix nobody sets, so overrides never leak in.
        ConfigLoader::new().with_env_prefix("UABRIDGE_LOADER_TEST_UNSET")
    }

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = isolated().load(file.path()).unwrap();

        assert_eq!(config.server.port, 4841);
        assert_eq!(config.server.application_name, "bridge-under-test");
        assert_eq!(config.bus.temperature.change_threshold, 0.5);
        assert_eq!(config.bus.temperature.unit, "celsius");
        assert_eq!(config.dispatch.unresolved, UnresolvedPolicy::Abort);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_toml_and_json() {
        let toml = "[server]\nport = 5000\n";
        let config = isolated().load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.server.port, 5000);

        let json = r#"{"server": {"port": 5001}, "watch": {"enabled": false}}"#;
        let config = isolated().load_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.server.port, 5001);
        assert!(!config.watch.enabled);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"server": {"prot": 5001}}"#;
        assert!(isolated().load_from_str(json, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = isolated().load("/nonexistent/uabridge.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert!(ConfigFormat::from_path(Path::new("config.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let result = isolated().resolve_env_placeholders("port: ${UABRIDGE_NOPE_PORT:4999}");
        assert_eq!(result, "port: 4999");

        let result = isolated().resolve_env_placeholders("name: ${UABRIDGE_NOPE_NAME}");
        assert_eq!(result, "name: ${UABRIDGE_NOPE_NAME}");

        let result = isolated().resolve_env_placeholders("broken: ${OPEN");
        assert_eq!(result, "broken: ${OPEN");
    }

    #[test]
    fn test_env_overrides() {
        let prefix = "UABRIDGE_LOADER_TEST_OVR";
        env::set_var(format!("{}_SERVER_PORT", prefix), "4900");
        env::set_var(format!("{}_LOG_LEVEL", prefix), "warning");
        env::set_var(format!("{}_DISPATCH_UNRESOLVED", prefix), "abort");

        let config = ConfigLoader::new()
            .with_env_prefix(prefix)
            .load_from_str("{}", ConfigFormat::Json)
            .unwrap();

        assert_eq!(config.server.port, 4900);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.dispatch.unresolved, UnresolvedPolicy::Abort);
    }

    #[test]
    fn test_invalid_env_port() {
        let prefix = "UABRIDGE_LOADER_TEST_BAD";
        env::set_var(format!("{}_SERVER_PORT", prefix), "not-a-port");

        let err = ConfigLoader::new()
            .with_env_prefix(prefix)
            .load_from_str("{}", ConfigFormat::Json)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }
}
