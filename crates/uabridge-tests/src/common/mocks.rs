// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! [`MockDeviceBus`] stands in for the device services. Units, values and
//! failures are scripted up front; every call is counted and every
//! subscription is recorded so tests can build matching notifications.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use uabridge_core::{BusError, BusSignal, DeviceBus, DeviceClass, SubscribeOptions, SubscriptionId};

/// Sender name used on every signal built by the mock.
pub const MOCK_SENDER: &str = ":1.42";

// =============================================================================
// MockDeviceBus
// =============================================================================

/// A recorded subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedSubscription {
    /// Device class.
    pub class: DeviceClass,
    /// Unit index.
    pub index: u32,
    /// Returned id.
    pub id: SubscriptionId,
    /// Options passed along.
    pub options: SubscribeOptions,
}

/// A scripted device bus.
#[derive(Debug)]
pub struct MockDeviceBus {
    temperatures: Mutex<Vec<f64>>,
    ports: Mutex<Vec<bool>>,
    next_id: AtomicU32,

    failing_counts: Mutex<Vec<DeviceClass>>,
    failing_reads: Mutex<Vec<(DeviceClass, u32)>>,
    failing_subscribes: Mutex<Vec<(DeviceClass, u32)>>,
    duplicate_ids: Mutex<bool>,

    count_calls: AtomicU64,
    read_calls: AtomicU64,
    subscriptions: Mutex<Vec<RecordedSubscription>>,
}

impl MockDeviceBus {
    /// Creates a bus with the given sensor readings and port states.
    pub fn new(temperatures: Vec<f64>, ports: Vec<bool>) -> Self {
        Self {
            temperatures: Mutex::new(temperatures),
            ports: Mutex::new(ports),
            next_id: AtomicU32::new(1),
            failing_counts: Mutex::new(Vec::new()),
            failing_reads: Mutex::new(Vec::new()),
            failing_subscribes: Mutex::new(Vec::new()),
            duplicate_ids: Mutex::new(false),
            count_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Starts subscription ids at `first` instead of 1.
    pub fn with_first_id(self, first: u32) -> Self {
        self.next_id.store(first, Ordering::SeqCst);
        self
    }

    /// Replaces the sensor readings; takes effect on the next enumeration.
    pub fn set_temperatures(&self, temperatures: Vec<f64>) {
        *self.temperatures.lock() = temperatures;
    }

    /// Replaces the port states; takes effect on the next enumeration.
    pub fn set_ports(&self, ports: Vec<bool>) {
        *self.ports.lock() = ports;
    }

    /// Makes the unit count query of `class` fail.
    pub fn fail_count(&self, class: DeviceClass) {
        self.failing_counts.lock().push(class);
    }

    /// Makes the value read of one unit fail.
    pub fn fail_read(&self, class: DeviceClass, index: u32) {
        self.failing_reads.lock().push((class, index));
    }

    /// Makes the subscription of one unit fail.
    pub fn fail_subscribe(&self, class: DeviceClass, index: u32) {
        self.failing_subscribes.lock().push((class, index));
    }

    /// Makes every subscription return the same id.
    pub fn return_duplicate_ids(&self) {
        *self.duplicate_ids.lock() = true;
    }

    /// Number of unit count queries.
    pub fn count_calls(&self) -> u64 {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Number of value reads.
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// All subscriptions so far, oldest first.
    pub fn subscriptions(&self) -> Vec<RecordedSubscription> {
        self.subscriptions.lock().clone()
    }

    /// The latest id handed out for one unit.
    pub fn subscription(&self, class: DeviceClass, index: u32) -> Option<SubscriptionId> {
        self.subscriptions
            .lock()
            .iter()
            .rev()
            .find(|s| s.class == class && s.index == index)
            .map(|s| s.id)
    }

    /// Builds a temperature notification for the current subscription of
    /// sensor `index`.
    pub fn temperature_signal(&self, index: u32, value: f64) -> Option<BusSignal> {
        let id = self.subscription(DeviceClass::Temperature, index)?;
        Some(BusSignal::temperature_changed(MOCK_SENDER, id, value))
    }

    /// Builds a port notification for the current subscription of port
    /// `index`.
    pub fn port_signal(&self, index: u32, state: bool) -> Option<BusSignal> {
        let id = self.subscription(DeviceClass::Port, index)?;
        Some(BusSignal::port_changed(MOCK_SENDER, id, state))
    }

    fn unavailable(&self, what: String) -> BusError {
        BusError::call_failed(what, "scripted failure")
    }
}

impl Default for MockDeviceBus {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl DeviceBus for MockDeviceBus {
    async fn count(&self, class: DeviceClass) -> Result<u32, BusError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_counts.lock().contains(&class) {
            return Err(self.unavailable(format!("count {}", class)));
        }
        let n = match class {
            DeviceClass::Temperature => self.temperatures.lock().len(),
            DeviceClass::Port => self.ports.lock().len(),
        };
        Ok(n as u32)
    }

    async fn temperature(&self, index: u32) -> Result<f64, BusError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_reads
            .lock()
            .contains(&(DeviceClass::Temperature, index))
        {
            return Err(self.unavailable(format!("temperature {}", index)));
        }
        self.temperatures
            .lock()
            .get(index as usize)
            .copied()
            .ok_or_else(|| BusError::invalid_response("GetTemperature", "no such sensor"))
    }

    async fn port_state(&self, index: u32) -> Result<bool, BusError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().contains(&(DeviceClass::Port, index)) {
            return Err(self.unavailable(format!("port {}", index)));
        }
        self.ports
            .lock()
            .get(index as usize)
            .copied()
            .ok_or_else(|| BusError::invalid_response("GetPortState", "no such port"))
    }

    async fn subscribe(
        &self,
        class: DeviceClass,
        index: u32,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionId, BusError> {
        if self.failing_subscribes.lock().contains(&(class, index)) {
            return Err(self.unavailable(format!("subscribe {} {}", class, index)));
        }

        let id = if *self.duplicate_ids.lock() {
            SubscriptionId::new(self.next_id.load(Ordering::SeqCst))
        } else {
            SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
        };

        self.subscriptions.lock().push(RecordedSubscription {
            class,
            index,
            id,
            options: *options,
        });
        Ok(id)
    }
}
