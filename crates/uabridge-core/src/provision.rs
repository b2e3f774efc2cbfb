// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Enumeration and provisioning.
//!
//! Run once per lifecycle cycle, right after a model server instance has
//! been created. For each [`DeviceClass`]:
//!
//! 1. ask the bus how many units exist (a failed query degrades to zero
//!    units and no registry)
//! 2. allocate a [`LabelRegistry`] of that size
//! 3. for every unit, read its current value, add a variable node, then
//!    subscribe to its changes and bind the returned id
//!
//! Per-unit failures are logged and leave the slot in place without a node
//! (value read failed) or without a subscription (subscribe failed). The
//! cycle itself never aborts.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bus::{DeviceBus, SubscribeOptions};
use crate::error::BusError;
use crate::registry::{LabelRegistry, Registries};
use crate::server::ModelServer;
use crate::types::{DeviceClass, Label, NodeValue};

// =============================================================================
// Reports
// =============================================================================

/// What went wrong for a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFailureKind {
    /// The current value could not be read; no node was added.
    ReadValue,
    /// The node could not be added to the address space.
    AddNode,
    /// The change subscription could not be registered.
    Subscribe,
    /// The returned subscription id could not be recorded.
    Bind,
}

/// A per-unit provisioning failure.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    /// Unit label.
    pub label: Label,
    /// Failed step.
    pub kind: UnitFailureKind,
    /// Error message.
    pub message: String,
}

/// Outcome of provisioning one device class.
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    /// Device class.
    pub class: DeviceClass,
    /// Unit count reported by the bus, `None` if the query failed.
    pub count: Option<u32>,
    /// Nodes added to the address space.
    pub nodes: usize,
    /// Subscriptions bound in the registry.
    pub subscriptions: usize,
    /// Per-unit failures.
    pub failures: Vec<UnitFailure>,
}

impl ClassReport {
    fn new(class: DeviceClass) -> Self {
        Self {
            class,
            count: None,
            nodes: 0,
            subscriptions: 0,
            failures: Vec::new(),
        }
    }

    /// Returns `true` if every unit was fully provisioned.
    pub fn is_complete(&self) -> bool {
        self.count.is_some() && self.failures.is_empty()
    }

    fn fail(&mut self, label: &Label, kind: UnitFailureKind, message: impl ToString) {
        self.failures.push(UnitFailure {
            label: label.clone(),
            kind,
            message: message.to_string(),
        });
    }
}

/// Outcome of a full provisioning cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    /// Per-class reports, in provisioning order.
    pub classes: Vec<ClassReport>,
}

impl ProvisionReport {
    /// Returns the report for `class`.
    pub fn class(&self, class: DeviceClass) -> Option<&ClassReport> {
        self.classes.iter().find(|r| r.class == class)
    }

    /// Returns the total number of nodes added.
    pub fn total_nodes(&self) -> usize {
        self.classes.iter().map(|r| r.nodes).sum()
    }

    /// Returns `true` if every class was fully provisioned.
    pub fn is_complete(&self) -> bool {
        self.classes.iter().all(ClassReport::is_complete)
    }
}

// =============================================================================
// Provisioner
// =============================================================================

/// Enumerates the bus and provisions the model server.
pub struct Provisioner<'a> {
    bus: &'a dyn DeviceBus,
    server: &'a dyn ModelServer,
    options: SubscribeOptions,
}

impl<'a> Provisioner<'a> {
    /// Creates a provisioner for one cycle.
    pub fn new(bus: &'a dyn DeviceBus, server: &'a dyn ModelServer, options: SubscribeOptions) -> Self {
        Self {
            bus,
            server,
            options,
        }
    }

    /// Provisions every device class and returns the new registries.
    pub async fn provision_all(&self) -> (Registries, ProvisionReport) {
        let mut registries = Registries::new();
        let mut report = ProvisionReport::default();

        for class in DeviceClass::ALL {
            let (registry, class_report) = self.provision_class(class).await;
            if let Some(registry) = registry {
                registries.insert(registry);
            }
            report.classes.push(class_report);
        }

        info!(
            nodes = report.total_nodes(),
            complete = report.is_complete(),
            "Provisioning finished"
        );
        (registries, report)
    }

    /// Provisions a single device class.
    ///
    /// Returns `None` for the registry when the unit count could not be
    /// obtained.
    pub async fn provision_class(&self, class: DeviceClass) -> (Option<LabelRegistry>, ClassReport) {
        let mut report = ClassReport::new(class);

        let count = match self.bus.count(class).await {
            Ok(count) => {
                info!(%class, count, "Enumerated units");
                count
            }
            Err(e) => {
                error!(
                    %class,
                    error = %e,
                    error_type = e.error_type(),
                    "Failed to get number of units, continuing with none"
                );
                return (None, report);
            }
        };
        report.count = Some(count);

        let mut registry = LabelRegistry::create(class, count as usize);

        for index in 0..count {
            let slot = index as usize;
            let Some(label) = registry.label(slot).cloned() else {
                break;
            };

            match self.read_value(class, index).await {
                Ok(value) => {
                    debug!(%label, %value, "Read current value");
                    match self.server.add_variable(&label, value) {
                        Ok(()) => report.nodes += 1,
                        Err(e) => {
                            error!(
                                %label,
                                error = %e,
                                error_type = e.error_type(),
                                "Failed to add variable node"
                            );
                            report.fail(&label, UnitFailureKind::AddNode, e);
                        }
                    }
                }
                Err(e) => {
                    error!(
                        %label,
                        error = %e,
                        error_type = e.error_type(),
                        "Failed to read current value"
                    );
                    report.fail(&label, UnitFailureKind::ReadValue, e);
                }
            }

            match self.bus.subscribe(class, index, &self.options).await {
                Ok(id) => match registry.bind(slot, id) {
                    Ok(()) => {
                        debug!(%label, subscription_id = %id, "Subscribed to changes");
                        report.subscriptions += 1;
                    }
                    Err(e) => {
                        error!(
                            %label,
                            subscription_id = %id,
                            error = %e,
                            error_type = e.error_type(),
                            "Failed to bind subscription"
                        );
                        report.fail(&label, UnitFailureKind::Bind, e);
                    }
                },
                Err(e) => {
                    warn!(
                        %label,
                        error = %e,
                        error_type = e.error_type(),
                        "Failed to subscribe to changes"
                    );
                    report.fail(&label, UnitFailureKind::Subscribe, e);
                }
            }
        }

        (Some(registry), report)
    }

    async fn read_value(&self, class: DeviceClass, index: u32) -> Result<NodeValue, BusError> {
        match class {
            DeviceClass::Temperature => self.bus.temperature(index).await.map(NodeValue::Double),
            DeviceClass::Port => self.bus.port_state(index).await.map(NodeValue::Boolean),
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
    use crate::types::SubscriptionId;
    use async_trait::async_trait;

    /// Two sensors, one port; sensor 1 has no readable value and port
    /// subscriptions fail.
    struct FlakyBus;

    #[async_trait]
    impl DeviceBus for FlakyBus {
        async fn count(&self, class: DeviceClass) -> Result<u32, BusError> {
            Ok(match class {
                DeviceClass::Temperature => 2,
                DeviceClass::Port => 1,
            })
        }

        async fn temperature(&self, index: u32) -> Result<f64, BusError> {
            if index == 1 {
                Err(BusError::call_failed("GetTemperature", "sensor offline"))
            } else {
                Ok(21.0)
            }
        }

        async fn port_state(&self, _index: u32) -> Result<bool, BusError> {
            Ok(true)
        }

        async fn subscribe(
            &self,
            class: DeviceClass,
            index: u32,
            _options: &SubscribeOptions,
        ) -> Result<SubscriptionId, BusError> {
            match class {
                DeviceClass::Temperature => Ok(SubscriptionId::new(10 + index)),
                DeviceClass::Port => Err(BusError::unavailable("io service down")),
            }
        }
    }

    #[tokio::test]
    async fn test_partial_failures_keep_slots() {
        let server = MemoryModelServer::new(4840);
        let provisioner = Provisioner::new(&FlakyBus, &server, SubscribeOptions::default());

        let (registries, report) = provisioner.provision_all().await;

        let temps = registries.get(DeviceClass::Temperature).unwrap();
        assert_eq!(temps.len(), 2);
        // Value read failed for sensor 1 but it is still subscribed.
        assert_eq!(temps.subscription(1), Some(SubscriptionId::new(11)));
        assert_eq!(server.labels(), vec![Label::from("port 0"), Label::from("temperature 0")]);

        let ports = registries.get(DeviceClass::Port).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports.bound_count(), 0);

        let temp_report = report.class(DeviceClass::Temperature).unwrap();
        assert_eq!(temp_report.nodes, 1);
        assert_eq!(temp_report.subscriptions, 2);
        assert_eq!(temp_report.failures[0].kind, UnitFailureKind::ReadValue);
        assert!(!report.is_complete());
    }
}
