// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the uabridge binary.

use thiserror::Error;

use uabridge_config::ConfigError;
use uabridge_core::{BridgeError, BusError, LifecycleError};

/// Result type alias for uabridge-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that end the uabridge process.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Initialization error.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Config parsing error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Bridge core error.
    #[error("{0}")]
    Core(#[from] BridgeError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Initialization(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::Core(BridgeError::Bus(_)) => 5,
            Self::Core(BridgeError::Lifecycle(e)) if e.is_configuration() => 1,
            Self::Core(BridgeError::Lifecycle(_)) => 6,
            Self::Core(_) => 7,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<BusError> for BinError {
    fn from(err: BusError) -> Self {
        Self::Core(err.into())
    }
}

impl From<LifecycleError> for BinError {
    fn from(err: LifecycleError) -> Self {
        Self::Core(err.into())
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Initialization(format!("{:#}", err))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain on stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = BinError::init("no system bus").with_context("starting bridge");
        assert_eq!(
            err.to_string(),
            "starting bridge: Initialization error: no system bus"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("test").exit_code(), 1);
        assert_eq!(BinError::init("test").exit_code(), 2);
        assert_eq!(BinError::runtime("test").exit_code(), 3);
        assert_eq!(BinError::from(BusError::unavailable("test")).exit_code(), 5);
    }

    #[test]
    fn test_lifecycle_exit_codes() {
        let bad_port = BinError::from(LifecycleError::PortOutOfRange { port: 80 });
        assert_eq!(bad_port.exit_code(), 1);

        let join = BinError::from(LifecycleError::Join {
            message: "panicked".to_string(),
        });
        assert_eq!(join.exit_code(), 6);
        assert_eq!(join.to_string(), "Lifecycle error: Failed to join server task: panicked");
    }

    #[test]
    fn test_other_core_errors_exit_seven() {
        let err = BinError::from(BridgeError::from(uabridge_core::ServerError::run("bind failed")));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_anyhow_is_initialization() {
        let err = BinError::from(anyhow::anyhow!("subscriber already set"));
        assert!(matches!(err, BinError::Initialization(_)));
    }
}
