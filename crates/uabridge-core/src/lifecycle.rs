// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server lifecycle controller.
//!
//! Owns the single model server instance, its serving task and the label
//! registries built for it.
//!
//! ```text
//!            launch(port)                     shutdown()
//! Stopped ───────────────▶ Provisioning ──▶ Running ───────────▶ Stopping ──▶ Stopped
//!    ▲                          │
//!    └──── factory failure ─────┘
//! ```
//!
//! `shutdown` cancels the serving task and awaits it before the instance
//! and the registries are released, so a new instance is never created
//! while the previous serving loop is still alive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BusSignal, DeviceBus, SubscribeOptions};
use crate::dispatch::{DispatchOutcome, Dispatcher, UnresolvedPolicy};
use crate::error::{LifecycleError, ServerError};
use crate::provision::{ProvisionReport, Provisioner};
use crate::registry::Registries;
use crate::server::{ModelServer, ServerFactory};
use crate::types::{validate_port, ServerState};

// =============================================================================
// Configuration
// =============================================================================

/// Settings applied to every lifecycle cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Options sent with every change subscription.
    pub subscribe: SubscribeOptions,
    /// Handling of notifications with unknown subscription ids.
    pub unresolved: UnresolvedPolicy,
}

/// Result of a successful [`LifecycleController::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigured {
    /// The server already listens on the requested port.
    Unchanged,
    /// The server was stopped and relaunched on a new port.
    Restarted {
        /// Previous port.
        old: u16,
        /// New port.
        new: u16,
    },
    /// No server was running; one was launched.
    Launched {
        /// New port.
        port: u16,
    },
}

// =============================================================================
// ServerHandle
// =============================================================================

struct ServerHandle {
    server: Arc<dyn ModelServer>,
    token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
    started_at: DateTime<Utc>,
}

// =============================================================================
// LifecycleController
// =============================================================================

/// Drives the model server through launch, shutdown and reconfiguration.
pub struct LifecycleController {
    factory: Arc<dyn ServerFactory>,
    bus: Arc<dyn DeviceBus>,
    subscribe: SubscribeOptions,
    dispatcher: Dispatcher,
    state: ServerState,
    handle: Option<ServerHandle>,
    registries: Registries,
    report: Option<ProvisionReport>,
    cycles: u64,
}

impl LifecycleController {
    /// Creates a stopped controller.
    pub fn new(
        factory: Arc<dyn ServerFactory>,
        bus: Arc<dyn DeviceBus>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            factory,
            bus,
            subscribe: config.subscribe,
            dispatcher: Dispatcher::new(config.unresolved),
            state: ServerState::Stopped,
            handle: None,
            registries: Registries::new(),
            report: None,
            cycles: 0,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the registries of the current cycle.
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Returns the running server instance, if any.
    pub fn server(&self) -> Option<&Arc<dyn ModelServer>> {
        self.handle.as_ref().map(|h| &h.server)
    }

    /// Returns the port of the running server.
    pub fn port(&self) -> Option<u16> {
        self.handle.as_ref().map(|h| h.server.port())
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the provisioning report of the current cycle.
    pub fn last_report(&self) -> Option<&ProvisionReport> {
        self.report.as_ref()
    }

    /// Returns the number of completed launches.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns when the current server was started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.handle.as_ref().map(|h| h.started_at)
    }

    /// Returns `true` if the serving task exited on its own.
    pub fn serving_task_exited(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.task.is_finished())
            .unwrap_or(false)
    }

    /// Creates a server on `port`, provisions it and starts its serving task.
    ///
    /// Valid only from `Stopped`. An out-of-range port is rejected before
    /// anything else happens.
    pub async fn launch(&mut self, port: u32) -> Result<(), LifecycleError> {
        if !self.state.is_stopped() {
            error!(state = %self.state, "Launch requested while server exists");
            return Err(LifecycleError::InvalidTransition {
                operation: "launch",
                state: self.state,
            });
        }

        let port = validate_port(port).map_err(|e| {
            error!(error = %e, error_type = e.error_type(), "Refusing to launch server");
            e
        })?;

        self.state = ServerState::Provisioning;
        info!(port, "Launching model server");

        let server = match self.factory.create(port) {
            Ok(server) => server,
            Err(e) => {
                error!(
                    port,
                    error = %e,
                    error_type = e.error_type(),
                    "Failed to create model server"
                );
                self.state = ServerState::Stopped;
                return Err(LifecycleError::Provisioning(e));
            }
        };

        // A fresh registry set per cycle; only retired ids carry over.
        let mut previous = std::mem::take(&mut self.registries);
        previous.retire();
        let (mut registries, report) =
            Provisioner::new(self.bus.as_ref(), server.as_ref(), self.subscribe)
                .provision_all()
                .await;
        registries.inherit_retired(previous);
        self.registries = registries;
        self.report = Some(report);

        let token = CancellationToken::new();
        let task = {
            let server = Arc::clone(&server);
            let token = token.clone();
            tokio::spawn(async move { server.run(token).await })
        };

        self.handle = Some(ServerHandle {
            server,
            token,
            task,
            started_at: Utc::now(),
        });
        self.state = ServerState::Running;
        self.cycles += 1;

        info!(port, cycle = self.cycles, "Model server running");
        Ok(())
    }

    /// Stops the serving task, waits for it and releases the instance and
    /// the registries.
    ///
    /// Valid only from `Running`.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        if !self.state.is_running() {
            error!(state = %self.state, "Shutdown requested while server is not running");
            return Err(LifecycleError::InvalidTransition {
                operation: "shutdown",
                state: self.state,
            });
        }

        let Some(handle) = self.handle.take() else {
            self.state = ServerState::Stopped;
            return Err(LifecycleError::InvalidTransition {
                operation: "shutdown",
                state: ServerState::Running,
            });
        };

        self.state = ServerState::Stopping;
        let port = handle.server.port();
        info!(port, "Stopping model server");

        handle.token.cancel();
        let joined = handle.task.await;

        drop(handle.server);
        self.registries.retire();
        self.report = None;
        self.state = ServerState::Stopped;

        match joined {
            Ok(Ok(())) => {
                debug!(port, "Serving task joined");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(
                    port,
                    error = %e,
                    error_type = e.error_type(),
                    "Serving task ended with error"
                );
                Ok(())
            }
            Err(e) => {
                error!(port, error = %e, "Serving task panicked");
                Err(LifecycleError::Join {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Applies a new listen port.
    ///
    /// An out-of-range port is rejected and the running server keeps
    /// going. A running server on a different port is stopped and
    /// relaunched with a fresh enumeration.
    pub async fn reconfigure(&mut self, port: u32) -> Result<Reconfigured, LifecycleError> {
        let new = validate_port(port).map_err(|e| {
            warn!(error = %e, error_type = e.error_type(), "Ignoring port change");
            e
        })?;

        match self.state {
            ServerState::Running => {
                let old = self.port().unwrap_or_default();
                if old == new {
                    debug!(port = new, "Port unchanged, keeping server");
                    return Ok(Reconfigured::Unchanged);
                }
                info!(old, new, "Port changed, restarting model server");
                self.shutdown().await?;
                self.launch(port).await?;
                Ok(Reconfigured::Restarted { old, new })
            }
            ServerState::Stopped => {
                self.launch(port).await?;
                Ok(Reconfigured::Launched { port: new })
            }
            state => Err(LifecycleError::InvalidTransition {
                operation: "reconfigure",
                state,
            }),
        }
    }

    /// Routes one bus notification to the current server.
    pub fn dispatch(&self, signal: &BusSignal) -> DispatchOutcome {
        let server = self.handle.as_ref().map(|h| &*h.server);
        self.dispatcher.dispatch(signal, &self.registries, server)
    }

    /// Returns `true` if `outcome` must stop the process.
    pub fn is_fatal(&self, outcome: &DispatchOutcome) -> bool {
        self.dispatcher.is_fatal(outcome)
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state)
            .field("port", &self.port())
            .field("registries", &self.registries)
            .field("cycles", &self.cycles)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::memory::MemoryServerFactory;
    use crate::types::{DeviceClass, SubscriptionId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports a configurable number of sensors and no ports.
    struct SensorBus {
        sensors: AtomicU32,
        next_id: AtomicU32,
    }

    impl SensorBus {
        fn new(sensors: u32) -> Self {
            Self {
                sensors: AtomicU32::new(sensors),
                next_id: AtomicU32::new(1),
            }
        }
    }

    #[async_trait]
    impl DeviceBus for SensorBus {
        async fn count(&self, class: DeviceClass) -> Result<u32, BusError> {
            match class {
                DeviceClass::Temperature => Ok(self.sensors.load(Ordering::SeqCst)),
                DeviceClass::Port => Ok(0),
            }
        }

        async fn temperature(&self, index: u32) -> Result<f64, BusError> {
            Ok(20.0 + index as f64)
        }

        async fn port_state(&self, _index: u32) -> Result<bool, BusError> {
            Ok(false)
        }

        async fn subscribe(
            &self,
            _class: DeviceClass,
            _index: u32,
            _options: &SubscribeOptions,
        ) -> Result<SubscriptionId, BusError> {
            Ok(SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }
    }

    fn controller(sensors: u32) -> (LifecycleController, Arc<MemoryServerFactory>, Arc<SensorBus>) {
        let factory = Arc::new(MemoryServerFactory::recording());
        let bus = Arc::new(SensorBus::new(sensors));
        let ctl = LifecycleController::new(factory.clone(), bus.clone(), LifecycleConfig::default());
        (ctl, factory, bus)
    }

    #[tokio::test]
    async fn test_launch_and_shutdown() {
        let (mut ctl, factory, _bus) = controller(2);

        ctl.launch(4840).await.unwrap();
        assert_eq!(ctl.state(), ServerState::Running);
        assert_eq!(ctl.port(), Some(4840));
        assert_eq!(ctl.registries().size(DeviceClass::Temperature), Some(2));
        assert_eq!(factory.latest().unwrap().node_count(), 2);

        ctl.shutdown().await.unwrap();
        assert_eq!(ctl.state(), ServerState::Stopped);
        assert!(ctl.server().is_none());
        assert!(ctl.registries().is_empty());
        assert!(!factory.latest().unwrap().is_running());
    }

    #[tokio::test]
    async fn test_port_out_of_range_has_no_effect() {
        let (mut ctl, factory, _bus) = controller(1);

        let err = ctl.launch(80).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(ctl.state(), ServerState::Stopped);
        assert!(factory.created().is_empty());

        ctl.launch(4840).await.unwrap();
        let err = ctl.reconfigure(70000).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PortOutOfRange { port: 70000 }));
        assert_eq!(ctl.state(), ServerState::Running);
        assert_eq!(ctl.port(), Some(4840));
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn test_misuse_is_reported() {
        let (mut ctl, _factory, _bus) = controller(0);

        let err = ctl.shutdown().await.unwrap_err();
        assert!(err.is_misuse());

        ctl.launch(4840).await.unwrap();
        let err = ctl.launch(4841).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                operation: "launch",
                state: ServerState::Running
            }
        ));
        assert_eq!(ctl.port(), Some(4840));
    }

    #[tokio::test]
    async fn test_factory_failure_reverts_to_stopped() {
        let (mut ctl, factory, _bus) = controller(1);
        factory.set_fail_create(true);

        let err = ctl.launch(4840).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Provisioning(_)));
        assert_eq!(ctl.state(), ServerState::Stopped);

        factory.set_fail_create(false);
        ctl.launch(4840).await.unwrap();
        assert!(ctl.state().is_running());
    }

    #[tokio::test]
    async fn test_reconfigure_reenumerates() {
        let (mut ctl, factory, bus) = controller(2);
        ctl.launch(4840).await.unwrap();

        bus.sensors.store(3, Ordering::SeqCst);
        let result = ctl.reconfigure(4841).await.unwrap();
        assert_eq!(result, Reconfigured::Restarted { old: 4840, new: 4841 });
        assert_eq!(ctl.registries().size(DeviceClass::Temperature), Some(3));
        assert_eq!(ctl.cycles(), 2);

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert!(!created[0].is_running());
        assert_eq!(created[1].port(), 4841);
        assert_eq!(created[1].node_count(), 3);
    }

    #[tokio::test]
    async fn test_reconfigure_same_port_is_noop() {
        let (mut ctl, factory, _bus) = controller(1);
        ctl.launch(4840).await.unwrap();

        assert_eq!(ctl.reconfigure(4840).await.unwrap(), Reconfigured::Unchanged);
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_through_controller() {
        let (mut ctl, factory, _bus) = controller(2);
        ctl.launch(4840).await.unwrap();

        let id = ctl
            .registries()
            .get(DeviceClass::Temperature)
            .and_then(|r| r.subscription(1))
            .unwrap();
        let outcome = ctl.dispatch(&BusSignal::temperature_changed(":1.9", id, 30.5));
        assert!(outcome.is_written());
        assert_eq!(factory.latest().unwrap().writes().len(), 1);

        ctl.shutdown().await.unwrap();
        let outcome = ctl.dispatch(&BusSignal::temperature_changed(":1.9", id, 31.0));
        assert!(matches!(outcome, DispatchOutcome::NoServer));
    }

    #[tokio::test]
    async fn test_plain_factory_frees_replaced_servers() {
        let factory = Arc::new(MemoryServerFactory::new());
        let bus = Arc::new(SensorBus::new(1));
        let mut ctl = LifecycleController::new(factory.clone(), bus, LifecycleConfig::default());
        ctl.launch(4840).await.unwrap();

        let first = Arc::downgrade(ctl.server().unwrap());
        let id = ctl
            .registries()
            .get(DeviceClass::Temperature)
            .and_then(|r| r.subscription(0))
            .unwrap();
        for i in 0..10_000 {
            let signal = BusSignal::temperature_changed(":1.9", id, i as f64);
            assert!(ctl.dispatch(&signal).is_written());
        }

        ctl.reconfigure(4841).await.unwrap();
        ctl.reconfigure(4842).await.unwrap();

        assert!(first.upgrade().is_none());
        let current = factory.latest().unwrap();
        assert_eq!(current.port(), 4842);
        assert!(current.writes().is_empty());
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_stale_ids_after_restart_are_not_fatal() {
        let factory = Arc::new(MemoryServerFactory::recording());
        let bus = Arc::new(SensorBus::new(2));
        let config = LifecycleConfig {
            unresolved: UnresolvedPolicy::Abort,
            ..LifecycleConfig::default()
        };
        let mut ctl = LifecycleController::new(factory, bus, config);
        ctl.launch(4840).await.unwrap();

        let stale = ctl
            .registries()
            .get(DeviceClass::Temperature)
            .and_then(|r| r.subscription(1))
            .unwrap();
        ctl.reconfigure(4841).await.unwrap();
        ctl.reconfigure(4842).await.unwrap();
        assert_eq!(ctl.registries().retired_count(), 4);

        let outcome = ctl.dispatch(&BusSignal::temperature_changed(":1.9", stale, 1.0));
        assert!(matches!(outcome, DispatchOutcome::Retired { .. }));
        assert!(!ctl.is_fatal(&outcome));

        let foreign = SubscriptionId::new(9_999);
        let outcome = ctl.dispatch(&BusSignal::temperature_changed(":1.9", foreign, 1.0));
        assert!(ctl.is_fatal(&outcome));
    }
}
