// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Dispatch Integration Tests
//!
//! Change notifications routed through a running controller.

use uabridge_core::{
    DecodeError, DeviceClass, DispatchOutcome, Label, ModelServer, NodeValue, SubscriptionId,
    UnresolvedPolicy,
};
use uabridge_tests::prelude::*;

#[tokio::test]
async fn test_temperature_change_updates_node() {
    init_test_logging();
    let mut bridge = Bridge::standard();
    bridge.controller.launch(4840).await.unwrap();

    let signal = bridge.bus.temperature_signal(1, 37.2).unwrap();
    let outcome = bridge.controller.dispatch(&signal);

    assert_eq!(
        outcome,
        DispatchOutcome::Written {
            label: Label::from("temperature 1"),
            value: NodeValue::Double(37.2),
        }
    );

    let server = bridge.factory.latest().unwrap();
    assert_eq!(
        server.read_value(&Label::from("temperature 1")).unwrap(),
        NodeValue::Double(37.2)
    );
    assert_eq!(
        server.read_value(&Label::from("temperature 0")).unwrap(),
        NodeValue::Double(21.5)
    );
    assert_eq!(server.writes().len(), 1);
}

#[tokio::test]
async fn test_port_change_updates_node() {
    let mut bridge = Bridge::standard();
    bridge.controller.launch(4840).await.unwrap();

    let signal = bridge.bus.port_signal(0, true).unwrap();
    assert!(bridge.controller.dispatch(&signal).is_written());

    let server = bridge.factory.latest().unwrap();
    assert_eq!(
        server.read_value(&Label::from("port 0")).unwrap(),
        NodeValue::Boolean(true)
    );
}

#[tokio::test]
async fn test_malformed_payloads_are_dropped() {
    let mut bridge = Bridge::standard();
    bridge.controller.launch(4840).await.unwrap();
    let id = bridge.bus.subscription(DeviceClass::Port, 0).unwrap().get();

    let outcome = bridge
        .controller
        .dispatch(&SignalFixtures::truncated_temperature(id));
    assert!(matches!(
        outcome,
        DispatchOutcome::DecodeFailed(DecodeError::ShortPayload { .. })
    ));

    let outcome = bridge.controller.dispatch(&SignalFixtures::mistyped_port(id));
    assert!(matches!(
        outcome,
        DispatchOutcome::DecodeFailed(DecodeError::TypeMismatch { .. })
    ));

    let outcome = bridge.controller.dispatch(&SignalFixtures::foreign());
    assert!(matches!(
        outcome,
        DispatchOutcome::DecodeFailed(DecodeError::UnknownSignal { .. })
    ));

    assert!(bridge.factory.latest().unwrap().writes().is_empty());

    let stats = bridge.controller.dispatcher().stats();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.decode_failed, 3);
}

#[tokio::test]
async fn test_unknown_id_dropped_by_default() {
    let mut bridge = Bridge::standard();
    bridge.controller.launch(4840).await.unwrap();

    let signal = uabridge_core::BusSignal::temperature_changed(MOCK_SENDER, SubscriptionId::new(999), 1.0);
    let outcome = bridge.controller.dispatch(&signal);

    assert!(matches!(outcome, DispatchOutcome::Unresolved { class: DeviceClass::Temperature, .. }));
    assert!(!bridge.controller.is_fatal(&outcome));
    assert!(bridge.factory.latest().unwrap().writes().is_empty());
}

#[tokio::test]
async fn test_unknown_id_fatal_under_abort() {
    let bus = MockDeviceBus::new(vec![20.0], vec![]);
    let mut bridge = Bridge::with_bus(bus, UnresolvedPolicy::Abort);
    bridge.controller.launch(4840).await.unwrap();

    let signal = uabridge_core::BusSignal::port_changed(MOCK_SENDER, SubscriptionId::new(7), true);
    let outcome = bridge.controller.dispatch(&signal);
    assert!(bridge.controller.is_fatal(&outcome));

    let known = bridge.bus.temperature_signal(0, 22.0).unwrap();
    let outcome = bridge.controller.dispatch(&known);
    assert!(!bridge.controller.is_fatal(&outcome));
}

#[tokio::test]
async fn test_ids_are_scoped_per_class() {
    // Both classes can hand out the same id.
    let bus = MockDeviceBus::new(vec![20.0], vec![false]);
    bus.return_duplicate_ids();
    let mut bridge = Bridge::with_bus(bus, UnresolvedPolicy::Drop);
    bridge.controller.launch(4840).await.unwrap();

    let id = bridge.bus.subscription(DeviceClass::Temperature, 0).unwrap();
    assert_eq!(bridge.bus.subscription(DeviceClass::Port, 0), Some(id));

    let outcome = bridge
        .controller
        .dispatch(&uabridge_core::BusSignal::port_changed(MOCK_SENDER, id, true));
    assert_eq!(
        outcome,
        DispatchOutcome::Written {
            label: Label::from("port 0"),
            value: NodeValue::Boolean(true),
        }
    );
}

#[tokio::test]
async fn test_notifications_while_stopped() {
    let mut bridge = Bridge::standard();
    bridge.controller.launch(4840).await.unwrap();
    let signal = bridge.bus.temperature_signal(0, 30.0).unwrap();
    bridge.controller.shutdown().await.unwrap();

    let outcome = bridge.controller.dispatch(&signal);
    assert_eq!(outcome, DispatchOutcome::NoServer);
    assert!(!bridge.controller.is_fatal(&outcome));
}
