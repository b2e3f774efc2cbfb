// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration change stream.
//!
//! [`ConfigWatcher`] polls the configuration file's modification time,
//! reloads it when it changes and turns the difference with the last
//! applied configuration into [`ConfigChange`] events. A failed reload is
//! logged and the previous configuration stays in force.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConfigResult;
use crate::loader::ConfigLoader;
use crate::schema::BridgeConfig;

// =============================================================================
// ConfigChange
// =============================================================================

/// A change between two applied configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// The server listen port changed.
    ServerPort {
        /// Previously applied port.
        old: u32,
        /// Newly configured port.
        new: u32,
    },
    /// A section changed that only takes effect after a process restart.
    RestartRequired {
        /// Name of the changed section.
        section: &'static str,
    },
}

/// Computes the changes from `old` to `new`.
pub fn diff(old: &BridgeConfig, new: &BridgeConfig) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    if old.server.port != new.server.port {
        changes.push(ConfigChange::ServerPort {
            old: old.server.port,
            new: new.server.port,
        });
    }

    let mut server = old.server.clone();
    server.port = new.server.port;
    if server != new.server {
        changes.push(ConfigChange::RestartRequired { section: "server" });
    }
    if old.bus != new.bus {
        changes.push(ConfigChange::RestartRequired { section: "bus" });
    }
    if old.dispatch != new.dispatch {
        changes.push(ConfigChange::RestartRequired { section: "dispatch" });
    }
    if old.logging != new.logging {
        changes.push(ConfigChange::RestartRequired { section: "logging" });
    }

    changes
}

// =============================================================================
// ConfigWatcher
// =============================================================================

/// Polling watcher over a configuration file.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    loader: ConfigLoader,
    last_modified: Option<SystemTime>,
    current: BridgeConfig,
    interval: Duration,
}

impl ConfigWatcher {
    /// Creates a watcher for `path`, starting from the already applied
    /// configuration `current`.
    pub fn new(path: impl Into<PathBuf>, loader: ConfigLoader, current: BridgeConfig) -> Self {
        let path = path.into();
        let interval = current.watch.poll_interval();
        Self {
            last_modified: modified_time(&path),
            path,
            loader,
            current,
            interval,
        }
    }

    /// Overrides the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last applied configuration.
    pub fn current(&self) -> &BridgeConfig {
        &self.current
    }

    /// Checks if the configuration file changed since it was last loaded
    /// successfully.
    pub fn has_changed(&self) -> bool {
        self.pending_modification().is_some()
    }

    fn pending_modification(&self) -> Option<SystemTime> {
        let modified = modified_time(&self.path)?;
        match self.last_modified {
            Some(last) if last == modified => None,
            _ => Some(modified),
        }
    }

    /// Reloads the file if it changed and returns the resulting changes.
    ///
    /// On error the last applied configuration is kept and the file is
    /// read again on the next poll.
    pub fn poll(&mut self) -> ConfigResult<Vec<ConfigChange>> {
        let Some(modified) = self.pending_modification() else {
            return Ok(Vec::new());
        };

        let config = self.loader.load(&self.path)?;
        self.last_modified = Some(modified);
        let changes = diff(&self.current, &config);
        if changes.is_empty() {
            debug!("Configuration file touched, nothing changed");
        } else {
            info!(changes = changes.len(), "Configuration changed");
        }
        self.current = config;
        Ok(changes)
    }

    /// Moves the watcher onto a background task.
    ///
    /// Changes are delivered on the returned receiver; the task stops when
    /// [`WatcherTask::stop`] is called or the receiver is dropped.
    pub fn spawn(mut self, capacity: usize) -> (mpsc::Receiver<ConfigChange>, WatcherTask) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let token = CancellationToken::new();
        let interval = self.interval;
        let cancel = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(path = %self.path.display(), ?interval, "Watching configuration file");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let changes = match self.poll() {
                    Ok(changes) => changes,
                    Err(e) => {
                        warn!(
                            error = %e,
                            error_type = e.error_type(),
                            "Failed to reload configuration, keeping previous"
                        );
                        continue;
                    }
                };

                for change in changes {
                    if tx.send(change).await.is_err() {
                        debug!("Change receiver dropped, stopping watcher");
                        return;
                    }
                }
            }

            debug!("Configuration watcher stopped");
        });

        (rx, WatcherTask { token, task })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

// =============================================================================
// WatcherTask
// =============================================================================

/// Handle to a spawned [`ConfigWatcher`].
#[derive(Debug)]
pub struct WatcherTask {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherTask {
    /// Stops the watcher and waits for its task to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Configuration watcher task failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
