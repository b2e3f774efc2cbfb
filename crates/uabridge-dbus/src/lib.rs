// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! D-Bus device bus for uabridge.
//!
//! [`DbusDeviceBus`] implements the `DeviceBus` trait from `uabridge-core`
//! against the temperature controller and I/O port services, and turns
//! their change signals into a single stream of `BusSignal`s.
//!
//! ```rust,ignore
//! let bus = DbusDeviceBus::connect(&config.bus).await?;
//! let mut signals = bus.signals(256).await?;
//! while let Some(signal) = signals.recv().await {
//!     controller.dispatch(&signal);
//! }
//! bus.disconnect().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bus;
pub mod signal;

pub use bus::DbusDeviceBus;
pub use signal::{message_to_signal, value_to_arg};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
