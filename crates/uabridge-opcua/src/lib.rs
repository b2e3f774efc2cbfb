// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA model server for uabridge.
//!
//! Implements the `ModelServer` and `ServerFactory` traits from
//! `uabridge-core` on top of the `opcua` crate's server.
//!
//! # Example
//!
//! ```rust,ignore
//! use uabridge_opcua::{OpcUaServerFactory, OpcUaSettings};
//! use uabridge_core::ServerFactory;
//!
//! let factory = OpcUaServerFactory::new(OpcUaSettings::from(&config.server));
//! let server = factory.create(4840)?;
//! server.add_variable(&"temperature 0".into(), 21.5.into())?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod convert;
pub mod server;

pub use server::{OpcUaModelServer, OpcUaServerFactory, OpcUaSettings};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
