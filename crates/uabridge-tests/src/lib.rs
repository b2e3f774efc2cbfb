// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge Integration Tests
//!
//! Shared test doubles and fixtures, plus the integration suites under
//! `tests/`.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p uabridge-tests
//! cargo test -p uabridge-tests --test integration_dispatch
//! ```
//!
//! ## Test Suites
//!
//! - `integration_provision.rs`: enumeration and node creation against a scripted bus
//! - `integration_dispatch.rs`: change notifications routed to nodes
//! - `integration_lifecycle.rs`: launch, shutdown and port changes
//! - `integration_supervisor.rs`: the serialized supervisor loop
//! - `integration_config.rs`: file loading, overrides and the change stream

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{eventually, init_test_logging, temp_test_dir};
}
