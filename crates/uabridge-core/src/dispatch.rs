// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change dispatcher.
//!
//! Every bus notification goes through [`Dispatcher::dispatch`]:
//!
//! ```text
//! BusSignal ──decode──▶ ChangeEvent ──resolve(registry)──▶ Label ──write──▶ ModelServer
//!     │                      │
//!     └─ malformed: drop     └─ unknown id: drop or abort (UnresolvedPolicy)
//! ```
//!
//! Ids bound in an earlier provisioning cycle are recognised as retired
//! and dropped quietly under either policy.
//!
//! Events are handled one at a time in delivery order. Nothing is retried
//! or deduplicated: the bus never re-sends a notification, and repeated
//! identical notifications simply produce repeated writes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::bus::{BusSignal, SignalArg};
use crate::error::{DecodeError, ServerError};
use crate::registry::{Registries, Resolution};
use crate::server::ModelServer;
use crate::types::{DeviceClass, Label, NodeValue, PortState, SubscriptionId};

/// Argument count of a `TemperatureChangeSignal`.
pub const TEMPERATURE_SIGNAL_ARGS: usize = 2;

/// Argument count of a `PortChanged` signal.
pub const PORT_SIGNAL_ARGS: usize = 7;

// =============================================================================
// UnresolvedPolicy
// =============================================================================

/// What to do with a notification whose subscription id is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Log and drop the notification.
    #[default]
    Drop,
    /// Treat the notification as a fatal error.
    ///
    /// Ids retired by a restart are exempt and always dropped.
    Abort,
}

impl std::str::FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown unresolved policy '{}'", other)),
        }
    }
}

// =============================================================================
// ChangeEvent
// =============================================================================

/// A decoded change notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeEvent {
    /// A temperature sensor reading changed.
    Temperature {
        /// Subscription id.
        id: SubscriptionId,
        /// New reading.
        value: f64,
    },
    /// An I/O port changed.
    Port {
        /// Subscription id.
        id: SubscriptionId,
        /// New port state and flags.
        state: PortState,
    },
}

impl ChangeEvent {
    /// Decodes a bus signal according to its name.
    ///
    /// Payload schemas:
    ///
    /// - `TemperatureChangeSignal`: `(id, value: double)`
    /// - `PortChanged`: `(id, state, virtual, hidden, input, trigger, active_low)`,
    ///   all flags boolean
    ///
    /// Extra trailing arguments are ignored.
    pub fn decode(signal: &BusSignal) -> Result<Self, DecodeError> {
        let class = DeviceClass::from_signal_name(&signal.signal_name).ok_or_else(|| {
            DecodeError::UnknownSignal {
                name: signal.signal_name.clone(),
            }
        })?;

        let args = PayloadReader::new(signal);
        match class {
            DeviceClass::Temperature => {
                args.require(TEMPERATURE_SIGNAL_ARGS)?;
                Ok(Self::Temperature {
                    id: args.subscription_id(0)?,
                    value: args.double(1)?,
                })
            }
            DeviceClass::Port => {
                args.require(PORT_SIGNAL_ARGS)?;
                Ok(Self::Port {
                    id: args.subscription_id(0)?,
                    state: PortState {
                        state: args.boolean(1)?,
                        virtual_port: args.boolean(2)?,
                        hidden: args.boolean(3)?,
                        input: args.boolean(4)?,
                        trigger: args.boolean(5)?,
                        active_low: args.boolean(6)?,
                    },
                })
            }
        }
    }

    /// Returns the device class of the event.
    pub fn class(&self) -> DeviceClass {
        match self {
            Self::Temperature { .. } => DeviceClass::Temperature,
            Self::Port { .. } => DeviceClass::Port,
        }
    }

    /// Returns the subscription id carried by the event.
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            Self::Temperature { id, .. } | Self::Port { id, .. } => *id,
        }
    }

    /// Returns the value propagated to the address space.
    pub fn node_value(&self) -> NodeValue {
        match self {
            Self::Temperature { value, .. } => NodeValue::Double(*value),
            Self::Port { state, .. } => NodeValue::Boolean(state.state),
        }
    }
}

/// Positional, typed access to a signal payload.
struct PayloadReader<'a> {
    signal: &'a BusSignal,
}

impl<'a> PayloadReader<'a> {
    fn new(signal: &'a BusSignal) -> Self {
        Self { signal }
    }

    fn require(&self, expected: usize) -> Result<(), DecodeError> {
        let actual = self.signal.payload.len();
        if actual < expected {
            return Err(DecodeError::ShortPayload {
                signal: self.signal.signal_name.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn mismatch(&self, index: usize, expected: &'static str) -> DecodeError {
        DecodeError::TypeMismatch {
            signal: self.signal.signal_name.clone(),
            index,
            expected,
            actual: self.signal.payload[index].type_name(),
        }
    }

    // The bus sends ids as int32; the bit pattern is the id.
    fn subscription_id(&self, index: usize) -> Result<SubscriptionId, DecodeError> {
        match self.signal.payload[index] {
            SignalArg::Int32(v) => Ok(SubscriptionId::new(v as u32)),
            SignalArg::UInt32(v) => Ok(SubscriptionId::new(v)),
            _ => Err(self.mismatch(index, "int32")),
        }
    }

    fn double(&self, index: usize) -> Result<f64, DecodeError> {
        match self.signal.payload[index] {
            SignalArg::Double(v) => Ok(v),
            _ => Err(self.mismatch(index, "double")),
        }
    }

    fn boolean(&self, index: usize) -> Result<bool, DecodeError> {
        match self.signal.payload[index] {
            SignalArg::Boolean(v) => Ok(v),
            _ => Err(self.mismatch(index, "boolean")),
        }
    }
}

// =============================================================================
// DispatchOutcome
// =============================================================================

/// Result of dispatching one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The value was written to the node.
    Written {
        /// Target node.
        label: Label,
        /// Written value.
        value: NodeValue,
    },
    /// The payload could not be decoded; the event was dropped.
    DecodeFailed(DecodeError),
    /// No registry entry carries the subscription id.
    Unresolved {
        /// Device class of the event.
        class: DeviceClass,
        /// Unknown subscription id.
        id: SubscriptionId,
    },
    /// The id belongs to a subscription from an earlier cycle.
    Retired {
        /// Device class of the event.
        class: DeviceClass,
        /// Retired subscription id.
        id: SubscriptionId,
    },
    /// The node write failed.
    WriteFailed {
        /// Target node.
        label: Label,
        /// Server error.
        error: ServerError,
    },
    /// No server is running; the event was dropped.
    NoServer,
}

impl DispatchOutcome {
    /// Returns `true` if a node was written.
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

// =============================================================================
// DispatchStats
// =============================================================================

/// Counters kept by the dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    written: AtomicU64,
    decode_failed: AtomicU64,
    unresolved: AtomicU64,
    retired: AtomicU64,
    write_failed: AtomicU64,
    no_server: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Notifications received.
    pub received: u64,
    /// Node writes issued.
    pub written: u64,
    /// Notifications dropped as malformed.
    pub decode_failed: u64,
    /// Notifications with an unknown subscription id.
    pub unresolved: u64,
    /// Notifications for retired subscriptions.
    pub retired: u64,
    /// Failed node writes.
    pub write_failed: u64,
    /// Notifications dropped while no server was running.
    pub no_server: u64,
}

impl DispatchStats {
    fn record(&self, outcome: &DispatchOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DispatchOutcome::Written { .. } => &self.written,
            DispatchOutcome::DecodeFailed(_) => &self.decode_failed,
            DispatchOutcome::Unresolved { .. } => &self.unresolved,
            DispatchOutcome::Retired { .. } => &self.retired,
            DispatchOutcome::WriteFailed { .. } => &self.write_failed,
            DispatchOutcome::NoServer => &self.no_server,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            decode_failed: self.decode_failed.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            write_failed: self.write_failed.load(Ordering::Relaxed),
            no_server: self.no_server.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes decoded notifications to node writes.
#[derive(Debug, Default)]
pub struct Dispatcher {
    policy: UnresolvedPolicy,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Creates a dispatcher with the given unresolved-id policy.
    pub fn new(policy: UnresolvedPolicy) -> Self {
        Self {
            policy,
            stats: DispatchStats::default(),
        }
    }

    /// Returns the unresolved-id policy.
    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    /// Returns the dispatch counters.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns `true` if the outcome must stop the process under the
    /// configured policy.
    pub fn is_fatal(&self, outcome: &DispatchOutcome) -> bool {
        self.policy == UnresolvedPolicy::Abort
            && matches!(outcome, DispatchOutcome::Unresolved { .. })
    }

    /// Handles one notification.
    pub fn dispatch(
        &self,
        signal: &BusSignal,
        registries: &Registries,
        server: Option<&dyn ModelServer>,
    ) -> DispatchOutcome {
        let outcome = self.route(signal, registries, server);
        self.stats.record(&outcome);
        outcome
    }

    fn route(
        &self,
        signal: &BusSignal,
        registries: &Registries,
        server: Option<&dyn ModelServer>,
    ) -> DispatchOutcome {
        let event = match ChangeEvent::decode(signal) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    signal = %signal.signal_name,
                    sender = %signal.sender,
                    error = %e,
                    error_type = e.error_type(),
                    "Failed to get values from signal"
                );
                return DispatchOutcome::DecodeFailed(e);
            }
        };

        let Some(server) = server else {
            debug!(signal = %signal.signal_name, "No server running, dropping notification");
            return DispatchOutcome::NoServer;
        };

        let class = event.class();
        let id = event.subscription_id();
        let label = match registries.resolve(class, id) {
            Resolution::Resolved(label) => label.clone(),
            Resolution::Unresolved if registries.is_retired(class, id) => {
                debug!(
                    %class,
                    subscription_id = %id,
                    "Notification for retired subscription dropped"
                );
                return DispatchOutcome::Retired { class, id };
            }
            Resolution::Unresolved => {
                match self.policy {
                    UnresolvedPolicy::Drop => warn!(
                        %class,
                        subscription_id = %id,
                        sender = %signal.sender,
                        "Notification for unknown subscription dropped"
                    ),
                    UnresolvedPolicy::Abort => error!(
                        %class,
                        subscription_id = %id,
                        sender = %signal.sender,
                        "Notification for unknown subscription"
                    ),
                }
                return DispatchOutcome::Unresolved { class, id };
            }
        };

        if let ChangeEvent::Port { state, .. } = &event {
            debug!(%label, ?state, "Port changed");
        }

        let value = event.node_value();
        match server.write_value(&label, value) {
            Ok(()) => {
                debug!(%label, %value, "New value written");
                DispatchOutcome::Written { label, value }
            }
            Err(e) => {
                warn!(%label, error = %e, error_type = e.error_type(), "Failed to write new value");
                DispatchOutcome::WriteFailed { label, error: e }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryModelServer;
    use crate::registry::LabelRegistry;

    fn fixture() -> (Registries, MemoryModelServer) {
        let server = MemoryModelServer::recording(4840);
        let mut registries = Registries::new();

        let mut temps = LabelRegistry::create(DeviceClass::Temperature, 2);
        for i in 0..2 {
            temps.bind(i, SubscriptionId::new(100 + i as u32)).unwrap();
            server
                .add_variable(temps.label(i).unwrap(), NodeValue::Double(0.0))
                .unwrap();
        }
        let mut ports = LabelRegistry::create(DeviceClass::Port, 1);
        ports.bind(0, SubscriptionId::new(200)).unwrap();
        server
            .add_variable(ports.label(0).unwrap(), NodeValue::Boolean(false))
            .unwrap();

        registries.insert(temps);
        registries.insert(ports);
        (registries, server)
    }

    #[test]
    fn test_decode_temperature() {
        let signal = BusSignal::temperature_changed(":1.2", SubscriptionId::new(7), 36.6);
        let event = ChangeEvent::decode(&signal).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Temperature {
                id: SubscriptionId::new(7),
                value: 36.6
            }
        );
        assert_eq!(event.node_value(), NodeValue::Double(36.6));
    }

    #[test]
    fn test_decode_port_flags() {
        let signal = BusSignal::new(
            "PortChanged",
            ":1.3",
            vec![
                SignalArg::Int32(4),
                SignalArg::Boolean(true),
                SignalArg::Boolean(false),
                SignalArg::Boolean(true),
                SignalArg::Boolean(true),
                SignalArg::Boolean(false),
                SignalArg::Boolean(true),
            ],
        );
        let ChangeEvent::Port { id, state } = ChangeEvent::decode(&signal).unwrap() else {
            panic!("expected port event");
        };
        assert_eq!(id, SubscriptionId::new(4));
        assert!(state.state && state.hidden && state.input && state.active_low);
        assert!(!state.virtual_port && !state.trigger);
    }

    #[test]
    fn test_decode_short_payload() {
        let signal = BusSignal::new("TemperatureChangeSignal", ":1.2", vec![SignalArg::Int32(1)]);
        assert_eq!(
            ChangeEvent::decode(&signal),
            Err(DecodeError::ShortPayload {
                signal: "TemperatureChangeSignal".into(),
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_decode_type_mismatch() {
        let signal = BusSignal::new(
            "TemperatureChangeSignal",
            ":1.2",
            vec![SignalArg::Int32(1), SignalArg::Str("hot".into())],
        );
        assert!(matches!(
            ChangeEvent::decode(&signal),
            Err(DecodeError::TypeMismatch { index: 1, expected: "double", actual: "string", .. })
        ));
    }

    #[test]
    fn test_decode_negative_id_keeps_bits() {
        let signal = BusSignal::new(
            "TemperatureChangeSignal",
            ":1.2",
            vec![SignalArg::Int32(-1), SignalArg::Double(1.0)],
        );
        let event = ChangeEvent::decode(&signal).unwrap();
        assert_eq!(event.subscription_id(), SubscriptionId::new(u32::MAX));
    }

    #[test]
    fn test_dispatch_writes_exactly_one_node() {
        let (registries, server) = fixture();
        let dispatcher = Dispatcher::default();

        let signal = BusSignal::temperature_changed(":1.2", SubscriptionId::new(101), 36.6);
        let outcome = dispatcher.dispatch(&signal, &registries, Some(&server));

        assert!(outcome.is_written());
        assert_eq!(
            server.writes(),
            vec![(Label::from("temperature 1"), NodeValue::Double(36.6))]
        );
        assert_eq!(
            server.read_value(&Label::from("temperature 0")).unwrap(),
            NodeValue::Double(0.0)
        );
    }

    #[test]
    fn test_dispatch_port() {
        let (registries, server) = fixture();
        let dispatcher = Dispatcher::default();

        let signal = BusSignal::port_changed(":1.3", SubscriptionId::new(200), true);
        dispatcher.dispatch(&signal, &registries, Some(&server));

        assert_eq!(
            server.read_value(&Label::from("port 0")).unwrap(),
            NodeValue::Boolean(true)
        );
    }

    #[test]
    fn test_dispatch_malformed_drops() {
        let (registries, server) = fixture();
        let dispatcher = Dispatcher::default();

        let signal = BusSignal::new("PortChanged", ":1.3", vec![SignalArg::Int32(200)]);
        let outcome = dispatcher.dispatch(&signal, &registries, Some(&server));

        assert!(matches!(outcome, DispatchOutcome::DecodeFailed(_)));
        assert!(server.writes().is_empty());
        assert_eq!(dispatcher.stats().decode_failed, 1);
    }

    #[test]
    fn test_dispatch_unresolved_policy() {
        let (registries, server) = fixture();
        // The port id is unknown to the temperature registry.
        let signal = BusSignal::temperature_changed(":1.2", SubscriptionId::new(200), 1.0);

        let lenient = Dispatcher::new(UnresolvedPolicy::Drop);
        let outcome = lenient.dispatch(&signal, &registries, Some(&server));
        assert!(matches!(outcome, DispatchOutcome::Unresolved { .. }));
        assert!(!lenient.is_fatal(&outcome));

        let strict = Dispatcher::new(UnresolvedPolicy::Abort);
        let outcome = strict.dispatch(&signal, &registries, Some(&server));
        assert!(strict.is_fatal(&outcome));
        assert!(server.writes().is_empty());
    }

    #[test]
    fn test_retired_id_is_dropped_under_abort() {
        let (mut previous, server) = fixture();
        previous.retire();

        let mut temps = LabelRegistry::create(DeviceClass::Temperature, 1);
        temps.bind(0, SubscriptionId::new(300)).unwrap();
        let mut registries = Registries::new();
        registries.insert(temps);
        registries.inherit_retired(previous);

        let dispatcher = Dispatcher::new(UnresolvedPolicy::Abort);

        let stale = BusSignal::temperature_changed(":1.2", SubscriptionId::new(101), 1.0);
        let outcome = dispatcher.dispatch(&stale, &registries, Some(&server));
        assert_eq!(
            outcome,
            DispatchOutcome::Retired {
                class: DeviceClass::Temperature,
                id: SubscriptionId::new(101)
            }
        );
        assert!(!dispatcher.is_fatal(&outcome));

        let foreign = BusSignal::temperature_changed(":1.2", SubscriptionId::new(555), 1.0);
        let outcome = dispatcher.dispatch(&foreign, &registries, Some(&server));
        assert!(dispatcher.is_fatal(&outcome));

        let stats = dispatcher.stats();
        assert_eq!((stats.retired, stats.unresolved), (1, 1));
        assert!(server.writes().is_empty());
    }

    #[test]
    fn test_dispatch_without_server() {
        let (registries, _server) = fixture();
        let dispatcher = Dispatcher::new(UnresolvedPolicy::Abort);

        let signal = BusSignal::temperature_changed(":1.2", SubscriptionId::new(999), 1.0);
        let outcome = dispatcher.dispatch(&signal, &registries, None);
        assert!(matches!(outcome, DispatchOutcome::NoServer));
        assert!(!dispatcher.is_fatal(&outcome));
    }

    #[test]
    fn test_repeated_notifications_repeat_writes() {
        let (registries, server) = fixture();
        let dispatcher = Dispatcher::default();
        let signal = BusSignal::temperature_changed(":1.2", SubscriptionId::new(100), 5.0);

        dispatcher.dispatch(&signal, &registries, Some(&server));
        dispatcher.dispatch(&signal, &registries, Some(&server));

        assert_eq!(server.writes().len(), 2);
        assert_eq!(dispatcher.stats().written, 2);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("drop".parse::<UnresolvedPolicy>().unwrap(), UnresolvedPolicy::Drop);
        assert_eq!("ABORT".parse::<UnresolvedPolicy>().unwrap(), UnresolvedPolicy::Abort);
        assert!("crash".parse::<UnresolvedPolicy>().is_err());
    }
}
