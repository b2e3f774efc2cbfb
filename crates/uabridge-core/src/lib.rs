// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-core
//!
//! Subscription mapping and change propagation between a device bus and an
//! OPC UA address space.
//!
//! - **Types**: `DeviceClass`, `Label`, `SubscriptionId`, `NodeValue`, `ServerState`
//! - **Error**: Unified error hierarchy
//! - **Bus / Server**: Collaborator traits implemented by the transport crates
//! - **Registry**: Label registry mapping subscription ids to labels
//! - **Provision**: Enumeration and node provisioning
//! - **Dispatch**: Decoding and routing of change notifications
//! - **Lifecycle**: Launch, shutdown and reconfiguration of the model server
//! - **Memory**: In-process model server used for dry runs and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uabridge_core::{LifecycleConfig, LifecycleController, MemoryServerFactory};
//!
//! let mut controller = LifecycleController::new(
//!     Arc::new(MemoryServerFactory::new()),
//!     bus,
//!     LifecycleConfig::default(),
//! );
//! controller.launch(4840).await?;
//!
//! while let Some(signal) = signals.recv().await {
//!     controller.dispatch(&signal);
//! }
//!
//! controller.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Collaborator Interfaces
// =============================================================================

pub mod bus;
pub mod server;
pub mod memory;

// =============================================================================
// Bridge Modules
// =============================================================================

pub mod registry;
pub mod provision;
pub mod dispatch;
pub mod lifecycle;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use bus::{BusSignal, DeviceBus, SignalArg, SubscribeOptions};
pub use server::{ModelServer, ServerFactory};
pub use memory::{MemoryModelServer, MemoryServerFactory};

pub use registry::{LabelRegistry, Registries, RegistryEntry, Resolution};
pub use provision::{ClassReport, ProvisionReport, Provisioner, UnitFailure, UnitFailureKind};
pub use dispatch::{
    ChangeEvent, DispatchOutcome, DispatchStatsSnapshot, Dispatcher, UnresolvedPolicy,
};
pub use lifecycle::{LifecycleConfig, LifecycleController, Reconfigured};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
