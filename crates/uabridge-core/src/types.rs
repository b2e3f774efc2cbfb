// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for uabridge.
//!
//! These types are shared by the registry, the provisioning pass, the
//! dispatcher and both collaborator implementations (D-Bus and OPC UA).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LifecycleError;

// =============================================================================
// Constants
// =============================================================================

/// Lowest listen port accepted by the lifecycle controller.
pub const MIN_PORT: u32 = 1024;

/// Highest listen port accepted by the lifecycle controller.
pub const MAX_PORT: u32 = 65535;

/// Validates a listen port and narrows it to `u16`.
///
/// Privileged ports (below 1024) and values that do not fit a TCP port are
/// rejected.
///
/// # Examples
///
/// ```
/// use uabridge_core::types::validate_port;
///
/// assert_eq!(validate_port(4840).unwrap(), 4840);
/// assert!(validate_port(80).is_err());
/// assert!(validate_port(70000).is_err());
/// ```
pub fn validate_port(port: u32) -> Result<u16, LifecycleError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(port as u16)
    } else {
        Err(LifecycleError::PortOutOfRange { port })
    }
}

// =============================================================================
// DeviceClass
// =============================================================================

/// The class of physical unit mirrored into the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Temperature sensor, mirrored as a `Double` node.
    Temperature,
    /// I/O port, mirrored as a `Boolean` node.
    Port,
}

impl DeviceClass {
    /// All device classes, in provisioning order.
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Temperature, DeviceClass::Port];

    /// Returns the kind word used in generated labels.
    #[inline]
    pub fn label_kind(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Port => "port",
        }
    }

    /// Returns the value type of nodes provisioned for this class.
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Temperature => ValueType::Double,
            Self::Port => ValueType::Boolean,
        }
    }

    /// Returns the bus signal name carrying change notifications for this class.
    #[inline]
    pub fn signal_name(&self) -> &'static str {
        match self {
            Self::Temperature => "TemperatureChangeSignal",
            Self::Port => "PortChanged",
        }
    }

    /// Maps a bus signal name back to its device class.
    pub fn from_signal_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.signal_name() == name)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_kind())
    }
}

// =============================================================================
// SubscriptionId
// =============================================================================

/// Opaque identifier handed out by the device bus when a change
/// subscription is registered.
///
/// This is the only correlation key carried by change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Creates a subscription id.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SubscriptionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// =============================================================================
// Label
// =============================================================================

/// Stable display name of a mirrored unit, also used as its node identity.
///
/// # Examples
///
/// ```
/// use uabridge_core::types::{DeviceClass, Label};
///
/// let label = Label::generate(DeviceClass::Temperature, 3);
/// assert_eq!(label.as_str(), "temperature 3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Creates a label from an arbitrary string.
    #[inline]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Generates the label of unit `index` of the given class.
    pub fn generate(class: DeviceClass, index: usize) -> Self {
        Self(format!("{} {}", class.label_kind(), index))
    }

    /// Returns the label as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the label is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Values
// =============================================================================

/// Scalar value type of a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// 64-bit floating point.
    Double,
    /// Boolean.
    Boolean,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double => write!(f, "Double"),
            Self::Boolean => write!(f, "Boolean"),
        }
    }
}

/// Value stored in a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NodeValue {
    /// Floating point value (temperature sensors).
    Double(f64),
    /// Boolean value (I/O port state).
    Boolean(bool),
}

impl NodeValue {
    /// Returns the type of this value.
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Double(_) => ValueType::Double,
            Self::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Returns the value as `f64` if it is a double.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Boolean(_) => None,
        }
    }

    /// Returns the value as `bool` if it is a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Double(_) => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for NodeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for NodeValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

// =============================================================================
// ServerState
// =============================================================================

/// Lifecycle state of the model server.
///
/// ```text
/// Stopped ──launch──▶ Provisioning ──▶ Running ──shutdown──▶ Stopping ──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No server instance exists.
    #[default]
    Stopped,
    /// A server instance is being built and populated.
    Provisioning,
    /// The serving loop is running.
    Running,
    /// The serving loop has been told to stop and is being joined.
    Stopping,
}

impl ServerState {
    /// Returns `true` if the server is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the server is stopped.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

// =============================================================================
// PortState
// =============================================================================

/// Full state carried by a `PortChanged` notification.
///
/// Only `state` is propagated to the address space; the remaining flags are
/// decoded so they can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortState {
    /// Logical port state.
    pub state: bool,
    /// Port is virtual (no physical terminal).
    pub virtual_port: bool,
    /// Port is hidden from the device UI.
    pub hidden: bool,
    /// Port is configured as an input.
    pub input: bool,
    /// Port is a trigger.
    pub trigger: bool,
    /// Port is active low.
    pub active_low: bool,
}

// =============================================================================
// Tests
// =============================================================================
