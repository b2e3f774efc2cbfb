// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-config
//!
//! Configuration management for the uabridge service.
//!
//! ## Features
//!
//! - **Schema Definition**: Defaulted, validated configuration sections
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `${VAR:default}` placeholders and `UABRIDGE_*` variables
//! - **Change Stream**: File watching that emits [`ConfigChange`] events
//!
//! ## Quick Start
//!
//! ```no_run
//! use uabridge_config::loader::load_config;
//!
//! let config = load_config("uabridge.yaml").unwrap();
//! println!("OPC UA port: {}", config.server.port);
//! ```
//!
//! ## Configuration Schema
//!
//! - `server` - OPC UA listen port, identity and namespace
//! - `bus` - Device bus services for temperature sensors and I/O ports
//! - `dispatch` - Unknown subscription handling and event queue size
//! - `logging` - Log level and format
//! - `watch` - Configuration file polling

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;
pub mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{
    BridgeConfig, BusConfig, DispatchConfig, LogFormat, LogLevel, LoggingConfig,
    PortServiceConfig, ServerConfig, TemperatureServiceConfig, WatchConfig,
};
pub use watcher::{diff, ConfigChange, ConfigWatcher, WatcherTask};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
