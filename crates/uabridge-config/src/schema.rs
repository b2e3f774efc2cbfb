// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for uabridge.
//!
//! Every section is optional in the file and falls back to its defaults,
//! so an empty document is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uabridge_core::{LifecycleConfig, SubscribeOptions, UnresolvedPolicy};

use crate::error::{ConfigError, ConfigResult};

/// Default OPC UA listen port.
pub const DEFAULT_SERVER_PORT: u32 = 4840;

/// Default namespace URI for provisioned nodes.
pub const DEFAULT_NAMESPACE_URI: &str = "urn:uabridge:devices";

/// Default temperature change threshold.
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 0.1;

/// Default bus event queue capacity.
pub const DEFAULT_EVENT_QUEUE: usize = 256;

/// Default config watch interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Smallest accepted config watch interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// Root Configuration
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// OPC UA server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Device bus services.
    #[serde(default)]
    pub bus: BusConfig,

    /// Change dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configuration file watching.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl BridgeConfig {
    /// Validates the configuration.
    ///
    /// The server port is not range-checked here; the
    /// lifecycle controller rejects out-of-range ports at launch.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.bus.validate()?;
        self.dispatch.validate()?;
        self.watch.validate()?;
        Ok(())
    }

    /// Returns the subscription options derived from the bus settings.
    pub fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            temperature_threshold: self.bus.temperature.change_threshold,
        }
    }

    /// Returns the lifecycle settings derived from this configuration.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            subscribe: self.subscribe_options(),
            unresolved: self.dispatch.unresolved,
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// OPC UA server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen port.
    #[serde(default = "default_server_port")]
    pub port: u32,

    /// Listen address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Application name announced to clients.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI announced to clients.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Namespace URI of the provisioned nodes.
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,

    /// PKI directory of the server.
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,
}

impl ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::validation("server.host", "cannot be empty"));
        }
        if self.application_name.is_empty() {
            return Err(ConfigError::validation(
                "server.application_name",
                "cannot be empty",
            ));
        }
        if self.namespace_uri.is_empty() {
            return Err(ConfigError::validation(
                "server.namespace_uri",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            host: default_host(),
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            namespace_uri: default_namespace_uri(),
            pki_dir: default_pki_dir(),
        }
    }
}

fn default_server_port() -> u32 {
    DEFAULT_SERVER_PORT
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_application_name() -> String {
    "uabridge".to_string()
}

fn default_application_uri() -> String {
    "urn:uabridge".to_string()
}

fn default_namespace_uri() -> String {
    DEFAULT_NAMESPACE_URI.to_string()
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("./pki")
}

// =============================================================================
// Bus Configuration
// =============================================================================

/// Device bus services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Temperature controller service.
    #[serde(default)]
    pub temperature: TemperatureServiceConfig,

    /// I/O port service.
    #[serde(default)]
    pub ports: PortServiceConfig,
}

impl BusConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.temperature.validate()?;
        self.ports.validate()
    }
}

/// Temperature controller service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemperatureServiceConfig {
    /// Well-known bus name.
    #[serde(default = "default_temperature_service")]
    pub service: String,

    /// Object path.
    #[serde(default = "default_temperature_object_path")]
    pub object_path: String,

    /// Interface name.
    #[serde(default = "default_temperature_service")]
    pub interface: String,

    /// Minimum change that triggers a notification.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,

    /// Unit requested when reading temperatures.
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl TemperatureServiceConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_endpoint(
            "bus.temperature",
            &self.service,
            &self.object_path,
            &self.interface,
        )?;
        if !self.change_threshold.is_finite() || self.change_threshold < 0.0 {
            return Err(ConfigError::validation(
                "bus.temperature.change_threshold",
                "must be a non-negative number",
            ));
        }
        if self.unit.is_empty() {
            return Err(ConfigError::validation(
                "bus.temperature.unit",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for TemperatureServiceConfig {
    fn default() -> Self {
        Self {
            service: default_temperature_service(),
            object_path: default_temperature_object_path(),
            interface: default_temperature_service(),
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
            unit: default_unit(),
        }
    }
}

fn default_temperature_service() -> String {
    "com.axis.TemperatureController".to_string()
}

fn default_temperature_object_path() -> String {
    "/com/axis/TemperatureController".to_string()
}

fn default_change_threshold() -> f64 {
    DEFAULT_CHANGE_THRESHOLD
}

fn default_unit() -> String {
    "celsius".to_string()
}

/// I/O port service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortServiceConfig {
    /// Well-known bus name.
    #[serde(default = "default_ports_service")]
    pub service: String,

    /// Object path.
    #[serde(default = "default_ports_object_path")]
    pub object_path: String,

    /// Interface name.
    #[serde(default = "default_ports_interface")]
    pub interface: String,
}

impl PortServiceConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_endpoint("bus.ports", &self.service, &self.object_path, &self.interface)
    }
}

impl Default for PortServiceConfig {
    fn default() -> Self {
        Self {
            service: default_ports_service(),
            object_path: default_ports_object_path(),
            interface: default_ports_interface(),
        }
    }
}

fn default_ports_service() -> String {
    "com.axis.IOControl".to_string()
}

fn default_ports_object_path() -> String {
    "/com/axis/IOControl/State".to_string()
}

fn default_ports_interface() -> String {
    "com.axis.IOControl.State".to_string()
}

fn validate_endpoint(
    section: &str,
    service: &str,
    object_path: &str,
    interface: &str,
) -> ConfigResult<()> {
    if service.is_empty() {
        return Err(ConfigError::validation(
            format!("{}.service", section),
            "cannot be empty",
        ));
    }
    if !object_path.starts_with('/') {
        return Err(ConfigError::validation(
            format!("{}.object_path", section),
            "must be an absolute object path",
        ));
    }
    if interface.is_empty() {
        return Err(ConfigError::validation(
            format!("{}.interface", section),
            "cannot be empty",
        ));
    }
    Ok(())
}

// =============================================================================
// Dispatch Configuration
// =============================================================================

/// Change dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Handling of notifications with unknown subscription ids.
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,

    /// Capacity of the bus event queue.
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl DispatchConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.event_queue == 0 {
            return Err(ConfigError::validation(
                "dispatch.event_queue",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            unresolved: UnresolvedPolicy::default(),
            event_queue: DEFAULT_EVENT_QUEUE,
        }
    }
}

fn default_event_queue() -> usize {
    DEFAULT_EVENT_QUEUE
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warning` as an alias.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON lines.
    Json,
    /// Compact single-line text.
    Compact,
}

// =============================================================================
// Watch Configuration
// =============================================================================

/// Configuration file watching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Reload the file when it changes.
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,

    /// Polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::validation(
                "watch.poll_interval_ms",
                format!("must be at least {}", MIN_POLL_INTERVAL_MS),
            ));
        }
        Ok(())
    }

    /// Returns the polling interval.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_watch_enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

// =============================================================================
// Tests
// =============================================================================
