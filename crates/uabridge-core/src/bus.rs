// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device bus collaborator interface.
//!
//! The device bus is a call/response service with a signal broadcast
//! channel. The bridge needs four calls from it (unit count, current
//! temperature, current port state, change subscription) and a stream of
//! [`BusSignal`]s. Implementations live outside this crate; the D-Bus one
//! is in `uabridge-dbus`.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::types::{DeviceClass, SubscriptionId};

// =============================================================================
// SubscribeOptions
// =============================================================================

/// Parameters passed along with a change subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Minimum temperature delta that triggers a notification.
    pub temperature_threshold: f64,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            temperature_threshold: 0.1,
        }
    }
}

// =============================================================================
// DeviceBus
// =============================================================================

/// Call interface of the device bus.
///
/// Every method reports failure through [`BusError`]; callers decide
/// whether a failure is fatal.
#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// Returns the number of physical units of `class`.
    ///
    /// For ports this is the sum of input and output ports.
    async fn count(&self, class: DeviceClass) -> Result<u32, BusError>;

    /// Returns the current reading of temperature sensor `index`.
    async fn temperature(&self, index: u32) -> Result<f64, BusError>;

    /// Returns the current state of I/O port `index`.
    async fn port_state(&self, index: u32) -> Result<bool, BusError>;

    /// Registers interest in changes of unit `index` and returns the id that
    /// future notifications will carry.
    async fn subscribe(
        &self,
        class: DeviceClass,
        index: u32,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionId, BusError>;
}

// =============================================================================
// SignalArg
// =============================================================================

/// A single positional argument of a bus signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalArg {
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Double precision float.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// String.
    Str(String),
    /// Any other type, kept by name for diagnostics.
    Other(String),
}

impl SignalArg {
    /// Returns the type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Str(_) => "string",
            Self::Other(_) => "other",
        }
    }
}

// =============================================================================
// BusSignal
// =============================================================================

/// A change notification as delivered by the bus transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSignal {
    /// Signal member name (e.g. `TemperatureChangeSignal`).
    pub signal_name: String,
    /// Unique bus name of the sender.
    pub sender: String,
    /// Positional payload.
    pub payload: Vec<SignalArg>,
}

impl BusSignal {
    /// Creates a signal.
    pub fn new(
        signal_name: impl Into<String>,
        sender: impl Into<String>,
        payload: Vec<SignalArg>,
    ) -> Self {
        Self {
            signal_name: signal_name.into(),
            sender: sender.into(),
            payload,
        }
    }

    /// Builds a well-formed `TemperatureChangeSignal`.
    pub fn temperature_changed(sender: impl Into<String>, id: SubscriptionId, value: f64) -> Self {
        Self::new(
            DeviceClass::Temperature.signal_name(),
            sender,
            vec![SignalArg::Int32(id.get() as i32), SignalArg::Double(value)],
        )
    }

    /// Builds a well-formed `PortChanged` signal with all auxiliary flags cleared.
    pub fn port_changed(sender: impl Into<String>, id: SubscriptionId, state: bool) -> Self {
        let mut payload = vec![SignalArg::Int32(id.get() as i32), SignalArg::Boolean(state)];
        payload.extend(std::iter::repeat(SignalArg::Boolean(false)).take(5));
        Self::new(DeviceClass::Port.signal_name(), sender, payload)
    }
}

impl fmt::Display for BusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.signal_name, self.sender)
    }
}
