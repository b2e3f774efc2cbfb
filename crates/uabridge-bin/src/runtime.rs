// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service runtime and supervisor loop.
//!
//! [`BridgeRuntime`] wires the device bus, the lifecycle controller and the
//! config watcher together, then hands control to [`supervise`], a single
//! task that serializes every input:
//!
//! ```text
//!   shutdown reasons ──┐
//!   bus signals ───────┼──> supervise ──> LifecycleController
//!   config changes ────┘                    ├─ dispatch (node writes)
//!                                           └─ reconfigure (restart on new port)
//! ```
//!
//! Teardown runs in a fixed order: stop the watcher, stop signal delivery,
//! then stop the server and release the registries.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn, Instrument};

use uabridge_config::{BridgeConfig, ConfigChange, ConfigLoader, ConfigWatcher};
use uabridge_core::{
    BusSignal, DispatchOutcome, LifecycleController, MemoryServerFactory, Reconfigured,
    ServerFactory, ServerState,
};
use uabridge_dbus::DbusDeviceBus;
use uabridge_opcua::{OpcUaServerFactory, OpcUaSettings};

use crate::error::{BinError, BinResult};
use crate::logging::app_span;
use crate::shutdown::{OsSignals, ShutdownCoordinator, ShutdownReason};

// =============================================================================
// Supervisor Loop
// =============================================================================

/// Inputs consumed by [`supervise`].
///
/// A `None` source is never polled. Sources that close are set to `None`.
#[derive(Debug)]
pub struct LoopInputs {
    /// Shutdown notifications.
    pub shutdown: broadcast::Receiver<ShutdownReason>,
    /// Change notifications from the device bus.
    pub signals: Option<mpsc::Receiver<BusSignal>>,
    /// Configuration changes.
    pub changes: Option<mpsc::Receiver<ConfigChange>>,
}

/// Why [`supervise`] returned.
#[derive(Debug)]
pub enum LoopExit {
    /// Ordinary shutdown.
    Shutdown(ShutdownReason),
    /// An unrecoverable condition; the process exits non-zero after teardown.
    Fatal(BinError),
}

/// Runs the supervisor loop until shutdown or a fatal condition.
///
/// Inputs are handled one at a time, so a reconfiguration never races a
/// node write.
pub async fn supervise(controller: &mut LifecycleController, inputs: &mut LoopInputs) -> LoopExit {
    loop {
        tokio::select! {
            biased;

            reason = inputs.shutdown.recv() => {
                return LoopExit::Shutdown(reason.unwrap_or(ShutdownReason::Requested));
            }

            signal = next_item(&mut inputs.signals) => match signal {
                Some(signal) => {
                    let outcome = controller.dispatch(&signal);
                    if controller.is_fatal(&outcome) {
                        return LoopExit::Fatal(fatal_outcome(&outcome));
                    }
                }
                None => {
                    warn!("Bus signal stream closed; values will no longer update");
                    inputs.signals = None;
                }
            },

            change = next_item(&mut inputs.changes) => match change {
                Some(change) => {
                    if let Err(e) = apply_change(controller, change).await {
                        return LoopExit::Fatal(e);
                    }
                }
                None => {
                    debug!("Config change stream closed");
                    inputs.changes = None;
                }
            },
        }
    }
}

async fn next_item<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn fatal_outcome(outcome: &DispatchOutcome) -> BinError {
    match outcome {
        DispatchOutcome::Unresolved { class, id } => {
            BinError::runtime(format!("unknown {} subscription {}", class, id))
        }
        other => BinError::runtime(format!("fatal dispatch outcome {:?}", other)),
    }
}

/// Applies one configuration change to the controller.
///
/// Only state machine misuse is returned as an error. Every other failure
/// is logged and leaves the bridge running in whatever state it reached.
pub async fn apply_change(
    controller: &mut LifecycleController,
    change: ConfigChange,
) -> BinResult<()> {
    match change {
        ConfigChange::ServerPort { old, new } => {
            info!(old, new, "Server port changed");
            match controller.reconfigure(new).await {
                Ok(Reconfigured::Unchanged) => {
                    debug!(port = new, "Server already on requested port");
                }
                Ok(Reconfigured::Restarted { old, new }) => {
                    info!(old, new, "Server restarted on new port");
                }
                Ok(Reconfigured::Launched { port }) => {
                    info!(port, "Server launched");
                }
                Err(e) if e.is_misuse() => return Err(e.into()),
                Err(e) if e.is_configuration() => {
                    warn!(error = %e, "Port change rejected; server unchanged");
                }
                Err(e) => {
                    error!(
                        error = %e,
                        error_type = e.error_type(),
                        state = %controller.state(),
                        "Reconfiguration failed"
                    );
                }
            }
        }
        ConfigChange::RestartRequired { section } => {
            warn!(section, "Change takes effect after a restart");
        }
    }
    Ok(())
}

// =============================================================================
// BridgeRuntime
// =============================================================================

/// The assembled service.
pub struct BridgeRuntime {
    config: BridgeConfig,
    config_path: Option<PathBuf>,
    loader: ConfigLoader,
    dry_run: bool,
    app_name: String,
    shutdown: ShutdownCoordinator,
}

impl BridgeRuntime {
    /// Returns the effective configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns a handle that can stop the runtime from elsewhere.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the bridge until a termination signal or a fatal error.
    pub async fn run(self) -> BinResult<()> {
        let span = app_span(&self.app_name);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> BinResult<()> {
        info!(
            version = uabridge_core::VERSION,
            port = self.config.server.port,
            dry_run = self.dry_run,
            "Starting uabridge"
        );

        let shutdown_rx = self.shutdown.subscribe();
        let listener = self.shutdown.listen(OsSignals::install()?);

        let bus = Arc::new(
            DbusDeviceBus::connect(&self.config.bus)
                .await
                .map_err(|e| BinError::from(e).with_context("connecting to device bus"))?,
        );
        let signals = bus.signals(self.config.dispatch.event_queue).await?;

        let factory: Arc<dyn ServerFactory> = if self.dry_run {
            info!("Dry run: address space is served from memory only");
            Arc::new(MemoryServerFactory::new())
        } else {
            Arc::new(OpcUaServerFactory::new(OpcUaSettings::from(&self.config.server)))
        };

        let mut controller =
            LifecycleController::new(factory, bus.clone(), self.config.lifecycle_config());

        match controller.launch(self.config.server.port).await {
            Ok(()) => {
                if let Some(report) = controller.last_report() {
                    info!(
                        nodes = report.total_nodes(),
                        complete = report.is_complete(),
                        "Address space provisioned"
                    );
                }
            }
            Err(e) if e.is_misuse() => return Err(e.into()),
            Err(e) => {
                error!(error = %e, "Server not started; waiting for a valid port");
            }
        }

        let (changes, watcher) = match self.spawn_watcher() {
            Some((rx, task)) => (Some(rx), Some(task)),
            None => (None, None),
        };

        let mut inputs = LoopInputs {
            shutdown: shutdown_rx,
            signals: Some(signals),
            changes,
        };

        let exit = supervise(&mut controller, &mut inputs).await;
        match &exit {
            LoopExit::Shutdown(reason) => info!(%reason, "Shutting down"),
            LoopExit::Fatal(e) => error!(error = %e, "Fatal error; shutting down"),
        }

        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        bus.disconnect().await;
        drop(inputs);

        if controller.state() == ServerState::Running {
            if let Err(e) = controller.shutdown().await {
                error!(error = %e, "Server shutdown failed");
            }
        }
        listener.abort();

        let stats = controller.dispatcher().stats();
        info!(
            received = stats.received,
            written = stats.written,
            dropped = stats.decode_failed + stats.unresolved + stats.retired + stats.no_server,
            cycles = controller.cycles(),
            "uabridge stopped"
        );

        match exit {
            LoopExit::Shutdown(_) => Ok(()),
            LoopExit::Fatal(e) => Err(e),
        }
    }

    fn spawn_watcher(
        &self,
    ) -> Option<(mpsc::Receiver<ConfigChange>, uabridge_config::WatcherTask)> {
        if !self.config.watch.enabled {
            debug!("Config watching disabled");
            return None;
        }
        let path = self.config_path.clone()?;
        info!(path = %path.display(), "Watching configuration file");

        let watcher = ConfigWatcher::new(path, self.loader.clone(), self.config.clone())
            .with_interval(self.config.watch.poll_interval());
        Some(watcher.spawn(4))
    }
}

impl std::fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("port", &self.config.server.port)
            .field("config_path", &self.config_path)
            .field("dry_run", &self.dry_run)
            .field("app_name", &self.app_name)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BridgeRuntime`].
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config: Option<BridgeConfig>,
    config_path: Option<PathBuf>,
    loader: Option<ConfigLoader>,
    port: Option<u32>,
    dry_run: bool,
    app_name: Option<String>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the already loaded configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the file watched for configuration changes.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Sets the loader used when the watched file is reloaded.
    pub fn loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Overrides the configured listen port.
    pub fn port(mut self, port: Option<u32>) -> Self {
        self.port = port;
        self
    }

    /// Serves the address space from memory only.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets the application name used in logs.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<BridgeRuntime> {
        let mut config = self.config.unwrap_or_default();
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config.validate()?;

        Ok(BridgeRuntime {
            config,
            config_path: self.config_path,
            loader: self.loader.unwrap_or_default(),
            dry_run: self.dry_run,
            app_name: self.app_name.unwrap_or_else(|| "uabridge".to_string()),
            shutdown: ShutdownCoordinator::new(),
        })
    }
}
