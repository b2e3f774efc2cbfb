// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for uabridge.
//!
//! # Error Hierarchy
//!
//! ```text
//! BridgeError (root)
//! ├── BusError        - Device bus method call failures
//! ├── ServerError     - Model server failures
//! ├── DecodeError     - Malformed change notifications
//! ├── RegistryError   - Label registry misuse
//! └── LifecycleError  - Server lifecycle violations and configuration range errors
//! ```
//!
//! How each kind is handled:
//!
//! - bus failures during enumeration degrade to "zero units" and are logged
//! - decode failures drop the event
//! - lifecycle misuse is fatal for the supervisor
//!
//! # Examples
//!
//! ```
//! use uabridge_core::error::{BridgeError, BusError};
//!
//! let error = BusError::call_failed("GetTemperature", "timeout");
//! let bridge: BridgeError = error.into();
//! assert_eq!(bridge.error_type(), "bus");
//! ```

use thiserror::Error;

use crate::types::{Label, ServerState, SubscriptionId, ValueType};

/// Result type alias using [`BridgeError`].
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// BridgeError - Root Error Type
// =============================================================================

/// The root error type for uabridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Device bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Model server error.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Notification decode error.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Lifecycle error.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl BridgeError {
    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Bus(_) => "bus",
            BridgeError::Server(_) => "server",
            BridgeError::Decode(_) => "decode",
            BridgeError::Registry(_) => "registry",
            BridgeError::Lifecycle(_) => "lifecycle",
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Errors raised by the device bus collaborator.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The bus or the target service could not be reached.
    #[error("Bus unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// A method call returned an error.
    #[error("Call to '{method}' failed: {message}")]
    CallFailed {
        /// Method name.
        method: String,
        /// Error message.
        message: String,
    },

    /// A method call returned a reply that could not be interpreted.
    #[error("Invalid reply from '{method}': {message}")]
    InvalidResponse {
        /// Method name.
        method: String,
        /// Error message.
        message: String,
    },
}

impl BusError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a call failure.
    pub fn call_failed(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid reply error.
    pub fn invalid_response(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::CallFailed { .. } => "call_failed",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}

// =============================================================================
// ServerError
// =============================================================================

/// Errors raised by the model server collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServerError {
    /// The server instance could not be created.
    #[error("Failed to create server on port {port}: {message}")]
    Create {
        /// Requested listen port.
        port: u16,
        /// Error message.
        message: String,
    },

    /// A node with this label already exists.
    #[error("Node '{label}' already exists")]
    NodeExists {
        /// Node label.
        label: Label,
    },

    /// No node with this label exists.
    #[error("Node '{label}' not found")]
    NodeNotFound {
        /// Node label.
        label: Label,
    },

    /// The written value does not match the node type.
    #[error("Type mismatch for node '{label}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Node label.
        label: Label,
        /// Node type.
        expected: ValueType,
        /// Written value type.
        actual: ValueType,
    },

    /// The serving loop failed.
    #[error("Server loop failed: {message}")]
    Run {
        /// Error message.
        message: String,
    },
}

impl ServerError {
    /// Creates a creation error.
    pub fn create(port: u16, message: impl Into<String>) -> Self {
        Self::Create {
            port,
            message: message.into(),
        }
    }

    /// Creates a node-not-found error.
    pub fn node_not_found(label: &Label) -> Self {
        Self::NodeNotFound {
            label: label.clone(),
        }
    }

    /// Creates a serving loop error.
    pub fn run(message: impl Into<String>) -> Self {
        Self::Run {
            message: message.into(),
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::NodeExists { .. } => "node_exists",
            Self::NodeNotFound { .. } => "node_not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Run { .. } => "run",
        }
    }
}

// =============================================================================
// DecodeError
// =============================================================================

/// Errors raised while decoding a change notification payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The payload has fewer arguments than the signal schema requires.
    #[error("Signal '{signal}' carries {actual} arguments, expected at least {expected}")]
    ShortPayload {
        /// Signal name.
        signal: String,
        /// Required argument count.
        expected: usize,
        /// Actual argument count.
        actual: usize,
    },

    /// An argument has the wrong type.
    #[error("Signal '{signal}' argument {index}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Signal name.
        signal: String,
        /// Argument position.
        index: usize,
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },

    /// The signal is not one the bridge subscribes to.
    #[error("Unknown signal '{name}'")]
    UnknownSignal {
        /// Signal name.
        name: String,
    },
}

impl DecodeError {
    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ShortPayload { .. } => "short_payload",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnknownSignal { .. } => "unknown_signal",
        }
    }
}

// =============================================================================
// RegistryError
// =============================================================================

/// Errors raised by the label registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Entry index is outside the registry.
    #[error("Index {index} out of range for registry of size {size}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Registry size.
        size: usize,
    },

    /// Entry already has a subscription id.
    #[error("Entry '{label}' is already bound to subscription {existing}")]
    AlreadyBound {
        /// Entry label.
        label: Label,
        /// The id already recorded.
        existing: SubscriptionId,
    },

    /// Subscription id is already bound to a different entry.
    #[error("Subscription {id} is already bound to '{label}'")]
    DuplicateSubscription {
        /// The duplicated id.
        id: SubscriptionId,
        /// The entry holding it.
        label: Label,
    },
}

impl RegistryError {
    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::AlreadyBound { .. } => "already_bound",
            Self::DuplicateSubscription { .. } => "duplicate_subscription",
        }
    }
}

// =============================================================================
// LifecycleError
// =============================================================================

/// Errors raised by the server lifecycle controller.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// Requested listen port is outside 1024..=65535.
    #[error("Port {port} is out of range (expected 1024..=65535)")]
    PortOutOfRange {
        /// Requested port.
        port: u32,
    },

    /// Operation is not valid in the current state.
    #[error("Cannot {operation} while server is {state}")]
    InvalidTransition {
        /// Requested operation.
        operation: &'static str,
        /// Current state.
        state: ServerState,
    },

    /// The server instance could not be created.
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ServerError),

    /// The serving task did not exit cleanly.
    #[error("Failed to join server task: {message}")]
    Join {
        /// Error message.
        message: String,
    },
}

impl LifecycleError {
    /// Returns `true` for configuration errors that leave the controller untouched.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::PortOutOfRange { .. })
    }

    /// Returns `true` for programming errors (misuse of the state machine).
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::PortOutOfRange { .. } => "port_out_of_range",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Provisioning(_) => "provisioning",
            Self::Join { .. } => "join",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
