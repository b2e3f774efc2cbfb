// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process model server.
//!
//! [`MemoryModelServer`] keeps the address space in a map. It backs the
//! `--dry-run` mode of the binary and the test suites. Only recording
//! instances keep a write history, and only a recording factory holds on to
//! the servers it created; plain ones retain nothing past a restart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::server::{ModelServer, ServerFactory};
use crate::types::{Label, NodeValue};

// =============================================================================
// MemoryModelServer
// =============================================================================

/// A model server whose address space lives in memory.
#[derive(Debug)]
pub struct MemoryModelServer {
    port: u16,
    nodes: RwLock<BTreeMap<Label, NodeValue>>,
    recording: bool,
    writes: Mutex<Vec<(Label, NodeValue)>>,
    running: AtomicBool,
    runs: AtomicU64,
}

impl MemoryModelServer {
    /// Creates an empty server for `port`.
    pub fn new(port: u16) -> Self {
        Self::with_recording(port, false)
    }

    /// Creates an empty server for `port` that records every write.
    pub fn recording(port: u16) -> Self {
        Self::with_recording(port, true)
    }

    fn with_recording(port: u16, recording: bool) -> Self {
        Self {
            port,
            nodes: RwLock::new(BTreeMap::new()),
            recording,
            writes: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        }
    }

    /// Returns the labels of all nodes, sorted.
    pub fn labels(&self) -> Vec<Label> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns a copy of the write history (provisioning excluded).
    ///
    /// Always empty unless the server was created with [`Self::recording`].
    pub fn writes(&self) -> Vec<(Label, NodeValue)> {
        self.writes.lock().clone()
    }

    /// Returns `true` while the serving loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns how many times the serving loop was entered.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelServer for MemoryModelServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn add_variable(&self, label: &Label, initial: NodeValue) -> Result<(), ServerError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(label) {
            return Err(ServerError::NodeExists {
                label: label.clone(),
            });
        }
        nodes.insert(label.clone(), initial);
        Ok(())
    }

    fn write_value(&self, label: &Label, value: NodeValue) -> Result<(), ServerError> {
        let mut nodes = self.nodes.write();
        let slot = nodes
            .get_mut(label)
            .ok_or_else(|| ServerError::node_not_found(label))?;

        if slot.value_type() != value.value_type() {
            return Err(ServerError::TypeMismatch {
                label: label.clone(),
                expected: slot.value_type(),
                actual: value.value_type(),
            });
        }

        *slot = value;
        if self.recording {
            self.writes.lock().push((label.clone(), value));
        }
        Ok(())
    }

    fn read_value(&self, label: &Label) -> Result<NodeValue, ServerError> {
        self.nodes
            .read()
            .get(label)
            .copied()
            .ok_or_else(|| ServerError::node_not_found(label))
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), ServerError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        info!(port = self.port, "In-memory model server running");

        shutdown.cancelled().await;

        self.running.store(false, Ordering::SeqCst);
        debug!(port = self.port, "In-memory model server stopped");
        Ok(())
    }
}

// =============================================================================
// MemoryServerFactory
// =============================================================================

/// Factory producing [`MemoryModelServer`]s.
///
/// A plain factory only tracks its latest instance weakly, so a server is
/// freed as soon as the controller releases it. [`Self::recording`] keeps
/// every instance alive along with its write history for inspection.
#[derive(Debug, Default)]
pub struct MemoryServerFactory {
    recording: bool,
    created: Mutex<Vec<Arc<MemoryModelServer>>>,
    latest: Mutex<Weak<MemoryModelServer>>,
    fail_create: AtomicBool,
}

impl MemoryServerFactory {
    /// Creates a factory that retains nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that keeps every server it creates, each one
    /// recording its writes.
    pub fn recording() -> Self {
        Self {
            recording: true,
            ..Self::default()
        }
    }

    /// Makes every subsequent `create` call fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Returns every instance created so far, oldest first.
    ///
    /// Empty unless the factory is recording.
    pub fn created(&self) -> Vec<Arc<MemoryModelServer>> {
        self.created.lock().clone()
    }

    /// Returns the most recently created instance if it is still alive.
    pub fn latest(&self) -> Option<Arc<MemoryModelServer>> {
        self.latest.lock().upgrade()
    }
}

impl ServerFactory for MemoryServerFactory {
    fn create(&self, port: u16) -> Result<Arc<dyn ModelServer>, ServerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServerError::create(port, "creation disabled"));
        }

        let server = Arc::new(MemoryModelServer::with_recording(port, self.recording));
        *self.latest.lock() = Arc::downgrade(&server);
        if self.recording {
            self.created.lock().push(server.clone());
        }
        Ok(server)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_add_and_write() {
        let server = MemoryModelServer::recording(4840);
        let label = Label::from("temperature 0");

        server.add_variable(&label, NodeValue::Double(20.0)).unwrap();
        server.write_value(&label, NodeValue::Double(21.5)).unwrap();

        assert_eq!(server.read_value(&label).unwrap(), NodeValue::Double(21.5));
        assert_eq!(server.writes(), vec![(label, NodeValue::Double(21.5))]);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let server = MemoryModelServer::new(4840);
        let label = Label::from("port 0");
        server.add_variable(&label, NodeValue::Boolean(false)).unwrap();
        assert!(matches!(
            server.add_variable(&label, NodeValue::Boolean(true)),
            Err(ServerError::NodeExists { .. })
        ));
    }

    #[test]
    fn test_write_errors() {
        let server = MemoryModelServer::new(4840);
        let label = Label::from("port 0");
        assert!(matches!(
            server.write_value(&label, NodeValue::Boolean(true)),
            Err(ServerError::NodeNotFound { .. })
        ));

        server.add_variable(&label, NodeValue::Boolean(false)).unwrap();
        assert!(matches!(
            server.write_value(&label, NodeValue::Double(1.0)),
            Err(ServerError::TypeMismatch { .. })
        ));
        assert!(server.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let server = Arc::new(MemoryModelServer::new(4840));
        let token = CancellationToken::new();

        let task = {
            let server = server.clone();
            let token = token.clone();
            tokio::spawn(async move { server.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(server.is_running());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("server loop should exit")
            .unwrap()
            .unwrap();
        assert!(!server.is_running());
        assert_eq!(server.run_count(), 1);
    }

    #[test]
    fn test_factory_records_instances() {
        let factory = MemoryServerFactory::recording();
        factory.create(4840).unwrap();
        factory.create(4841).unwrap();
        assert_eq!(factory.created().len(), 2);
        assert_eq!(factory.latest().unwrap().port(), 4841);

        factory.set_fail_create(true);
        assert!(factory.create(4842).is_err());
        assert_eq!(factory.created().len(), 2);
    }

    #[test]
    fn test_plain_factory_retains_nothing() {
        let factory = MemoryServerFactory::new();
        let server = factory.create(4840).unwrap();
        let label = Label::from("temperature 0");
        server.add_variable(&label, NodeValue::Double(0.0)).unwrap();
        for i in 0..1000 {
            server.write_value(&label, NodeValue::Double(i as f64)).unwrap();
        }

        let latest = factory.latest().unwrap();
        assert!(latest.writes().is_empty());
        assert_eq!(latest.read_value(&label).unwrap(), NodeValue::Double(999.0));
        assert!(factory.created().is_empty());
        drop(latest);

        // The caller holds the only strong reference.
        assert_eq!(Arc::strong_count(&server), 1);
        drop(server);
        assert!(factory.latest().is_none());
    }
}
