// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Configuration documents in every supported format and prebuilt
//! controllers wired to the in-memory server.

use std::sync::Arc;

use uabridge_core::{
    BusSignal, LifecycleConfig, LifecycleController, MemoryServerFactory, SignalArg,
    UnresolvedPolicy,
};

use super::mocks::{MockDeviceBus, MOCK_SENDER};

// =============================================================================
// Configuration Documents
// =============================================================================

/// Configuration file contents.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A YAML file touching every section.
    pub fn full_yaml(port: u32) -> String {
        format!(
            r#"
server:
  port: {port}
  host: "127.0.0.1"
  application_name: "opcuaserver"
bus:
  temperature:
    change_threshold: 0.5
dispatch:
  unresolved: abort
  event_queue: 64
logging:
  level: debug
  format: json
watch:
  poll_interval_ms: 200
"#
        )
    }

    /// The same settings as [`Self::full_yaml`] in TOML.
    pub fn full_toml(port: u32) -> String {
        format!(
            r#"
[server]
port = {port}
host = "127.0.0.1"
application_name = "opcuaserver"

[bus.temperature]
change_threshold = 0.5

[dispatch]
unresolved = "abort"
event_queue = 64

[logging]
level = "debug"
format = "json"

[watch]
poll_interval_ms = 200
"#
        )
    }

    /// The same settings as [`Self::full_yaml`] in JSON.
    pub fn full_json(port: u32) -> String {
        format!(
            r#"{{
  "server": {{ "port": {port}, "host": "127.0.0.1", "application_name": "opcuaserver" }},
  "bus": {{ "temperature": {{ "change_threshold": 0.5 }} }},
  "dispatch": {{ "unresolved": "abort", "event_queue": 64 }},
  "logging": {{ "level": "debug", "format": "json" }},
  "watch": {{ "poll_interval_ms": 200 }}
}}"#
        )
    }

    /// A YAML file that only sets the port.
    pub fn port_only_yaml(port: u32) -> String {
        format!("server:\n  port: {port}\n")
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Notifications that are not produced by a well-behaved device service.
pub struct SignalFixtures;

impl SignalFixtures {
    /// A temperature notification missing its value.
    pub fn truncated_temperature(id: u32) -> BusSignal {
        BusSignal::new(
            "TemperatureChangeSignal",
            MOCK_SENDER,
            vec![SignalArg::Int32(id as i32)],
        )
    }

    /// A port notification whose state is a string.
    pub fn mistyped_port(id: u32) -> BusSignal {
        let mut payload = vec![SignalArg::Int32(id as i32), SignalArg::Str("high".to_string())];
        payload.extend(std::iter::repeat(SignalArg::Boolean(false)).take(5));
        BusSignal::new("PortChanged", MOCK_SENDER, payload)
    }

    /// A signal the bridge never subscribes to.
    pub fn foreign() -> BusSignal {
        BusSignal::new("NameOwnerChanged", "org.freedesktop.DBus", Vec::new())
    }
}

// =============================================================================
// Controllers
// =============================================================================

/// A controller over a mock bus and the in-memory server.
pub struct Bridge {
    /// The controller under test.
    pub controller: LifecycleController,
    /// Server instances created by the controller.
    pub factory: Arc<MemoryServerFactory>,
    /// The scripted bus.
    pub bus: Arc<MockDeviceBus>,
}

impl Bridge {
    /// Two sensors reading 21.5 and 36.6, one input port low.
    pub fn standard() -> Self {
        Self::with_bus(MockDeviceBus::new(vec![21.5, 36.6], vec![false]), UnresolvedPolicy::Drop)
    }

    /// A controller over `bus` with the given policy for unknown ids.
    pub fn with_bus(bus: MockDeviceBus, unresolved: UnresolvedPolicy) -> Self {
        let factory = Arc::new(MemoryServerFactory::recording());
        let bus = Arc::new(bus);
        let config = LifecycleConfig {
            unresolved,
            ..LifecycleConfig::default()
        };
        let controller = LifecycleController::new(factory.clone(), bus.clone(), config);
        Self {
            controller,
            factory,
            bus,
        }
    }
}
