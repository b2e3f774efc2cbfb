// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Model server collaborator interface.
//!
//! The model server owns the address space exposed to protocol clients.
//! The bridge only needs scalar variable nodes keyed by label, value writes
//! and a serving loop that stops when a [`CancellationToken`] fires.
//! Implementations must synchronize node access internally: the serving
//! loop and the dispatcher touch nodes concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::types::{Label, NodeValue};

/// A running (or runnable) model server instance.
#[async_trait]
pub trait ModelServer: Send + Sync {
    /// Returns the listen port this instance was created for.
    fn port(&self) -> u16;

    /// Adds a read-only variable node identified by `label`, typed after
    /// `initial` and holding it as its value.
    fn add_variable(&self, label: &Label, initial: NodeValue) -> Result<(), ServerError>;

    /// Writes a new value to the node identified by `label`.
    fn write_value(&self, label: &Label, value: NodeValue) -> Result<(), ServerError>;

    /// Reads the current value of the node identified by `label`.
    fn read_value(&self, label: &Label) -> Result<NodeValue, ServerError>;

    /// Runs the serving loop until `shutdown` is cancelled.
    ///
    /// Returns only after the loop has fully exited.
    async fn run(&self, shutdown: CancellationToken) -> Result<(), ServerError>;
}

/// Creates model server instances bound to a listen port.
pub trait ServerFactory: Send + Sync {
    /// Creates a new, empty server instance for `port`.
    fn create(&self, port: u16) -> Result<Arc<dyn ModelServer>, ServerError>;
}
