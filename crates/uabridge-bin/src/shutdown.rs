// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! OS termination signals (SIGINT, SIGTERM, SIGQUIT, SIGABRT) and internal
//! fatal conditions funnel into one [`ShutdownCoordinator`]. The supervisor
//! loop subscribes to it and runs the ordered teardown when the first
//! reason arrives; later reasons are ignored.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{BinError, BinResult};

// =============================================================================
// ShutdownReason
// =============================================================================

/// Why the service is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGQUIT.
    Quit,
    /// SIGABRT.
    Abort,
    /// Requested from inside the process.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
            Self::Abort => "SIGABRT",
            Self::Requested => "requested",
        };
        f.write_str(name)
    }
}

// =============================================================================
// OsSignals
// =============================================================================

/// Registered OS signal handlers.
///
/// Registration happens up front so a failure surfaces as a startup error
/// instead of a panic later on.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
    #[cfg(unix)]
    abort: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Registers the termination signal handlers.
    #[cfg(unix)]
    pub fn install() -> BinResult<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let register = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| BinError::init(format!("cannot register {} handler: {}", name, e)))
        };

        Ok(Self {
            interrupt: register(SignalKind::interrupt(), "SIGINT")?,
            terminate: register(SignalKind::terminate(), "SIGTERM")?,
            quit: register(SignalKind::quit(), "SIGQUIT")?,
            // SIGABRT is 6 on every supported unix.
            abort: register(SignalKind::from_raw(6), "SIGABRT")?,
        })
    }

    /// Registers the termination signal handlers.
    #[cfg(not(unix))]
    pub fn install() -> BinResult<Self> {
        Ok(Self {})
    }

    /// Waits for the next termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> ShutdownReason {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownReason::Interrupt,
            _ = self.terminate.recv() => ShutdownReason::Terminate,
            _ = self.quit.recv() => ShutdownReason::Quit,
            _ = self.abort.recv() => ShutdownReason::Abort,
        }
    }

    /// Waits for the next termination signal.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> ShutdownReason {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(e) => {
                warn!(error = %e, "Ctrl+C handler failed");
                std::future::pending().await
            }
        }
    }
}

impl fmt::Debug for OsSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsSignals").finish_non_exhaustive()
    }
}

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Broadcasts the first shutdown reason to every subscriber.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<ShutdownReason>,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to shutdown notifications.
    ///
    /// Subscribe before shutdown can be initiated; a receiver created
    /// afterwards never sees the reason.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.sender.subscribe()
    }

    /// Initiates shutdown. Returns `false` if it was already initiated.
    pub fn initiate(&self, reason: ShutdownReason) -> bool {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        info!(%reason, "Shutdown initiated");
        let _ = self.sender.send(reason);
        true
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Forwards OS signals into the coordinator.
    ///
    /// The first signal initiates shutdown; repeated signals are logged and
    /// otherwise ignored while the teardown runs.
    pub fn listen(&self, mut signals: OsSignals) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                let reason = signals.recv().await;
                if !coordinator.initiate(reason) {
                    warn!(%reason, "Shutdown already in progress");
                }
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_initiated());
        assert!(coordinator.initiate(ShutdownReason::Terminate));
        assert!(!coordinator.initiate(ShutdownReason::Interrupt));
        assert!(coordinator.is_initiated());

        assert_eq!(rx.recv().await.unwrap(), ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let coordinator = ShutdownCoordinator::new();
        let clone = coordinator.clone();
        let mut rx = coordinator.subscribe();

        clone.initiate(ShutdownReason::Requested);
        assert!(coordinator.is_initiated());
        assert_eq!(rx.recv().await.unwrap(), ShutdownReason::Requested);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(ShutdownReason::Abort.to_string(), "SIGABRT");
        assert_eq!(ShutdownReason::Requested.to_string(), "requested");
    }
}
