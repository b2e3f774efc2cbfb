// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! D-Bus implementation of the device bus.
//!
//! Talks to two device services on the system bus:
//!
//! | Class | Calls | Signal |
//! |-------|-------|--------|
//! | temperature | `GetNbrOfTemperatureSensors() -> i`, `GetTemperature(i s) -> d`, `RegisterForTemperatureChangeSignal(i d) -> i` | `TemperatureChangeSignal(i d)` |
//! | ports | `GetNbrPorts() -> (i i)`, `GetPortState(i) -> b`, `RegisterForPortChanged(i) -> i` | `PortChanged(i b b b b b b)` |

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::{Connection, Proxy};

use uabridge_config::BusConfig;
use uabridge_core::{BusError, BusSignal, DeviceBus, DeviceClass, SubscribeOptions, SubscriptionId};

use crate::signal::spawn_pump;

/// D-Bus backed device bus.
pub struct DbusDeviceBus {
    connection: Connection,
    temperature: Proxy<'static>,
    ports: Proxy<'static>,
    unit: String,
    token: CancellationToken,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl DbusDeviceBus {
    /// Connects to the system bus.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let connection = Connection::system()
            .await
            .map_err(|e| BusError::unavailable(format!("system bus: {}", e)))?;
        Self::with_connection(connection, config).await
    }

    /// Builds the service proxies on an existing connection.
    pub async fn with_connection(connection: Connection, config: &BusConfig) -> Result<Self, BusError> {
        let temperature = Proxy::new(
            &connection,
            config.temperature.service.clone(),
            config.temperature.object_path.clone(),
            config.temperature.interface.clone(),
        )
        .await
        .map_err(|e| BusError::unavailable(format!("{}: {}", config.temperature.service, e)))?;

        let ports = Proxy::new(
            &connection,
            config.ports.service.clone(),
            config.ports.object_path.clone(),
            config.ports.interface.clone(),
        )
        .await
        .map_err(|e| BusError::unavailable(format!("{}: {}", config.ports.service, e)))?;

        info!(
            temperature = %config.temperature.service,
            ports = %config.ports.service,
            "Connected to device bus"
        );

        Ok(Self {
            connection,
            temperature,
            ports,
            unit: config.temperature.unit.clone(),
            token: CancellationToken::new(),
            pumps: Mutex::new(Vec::new()),
        })
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Starts forwarding change signals of both services.
    ///
    /// Every signal lands on the returned receiver in arrival order per
    /// service.
    pub async fn signals(&self, capacity: usize) -> Result<mpsc::Receiver<BusSignal>, BusError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let streams = [
            (&self.temperature, DeviceClass::Temperature.signal_name()),
            (&self.ports, DeviceClass::Port.signal_name()),
        ];

        let mut pumps = Vec::with_capacity(streams.len());
        for (proxy, name) in streams {
            let stream = proxy
                .receive_signal(name)
                .await
                .map_err(|e| BusError::call_failed(name, e.to_string()))?;
            pumps.push(spawn_pump(name, stream, tx.clone(), self.token.child_token()));
        }

        self.pumps.lock().extend(pumps);
        debug!("Signal handlers registered");
        Ok(rx)
    }

    /// Stops signal delivery and waits for the pump tasks.
    ///
    /// No signal is forwarded once this returns.
    pub async fn disconnect(&self) {
        self.token.cancel();
        let pumps = std::mem::take(&mut *self.pumps.lock());
        for pump in pumps {
            if let Err(e) = pump.await {
                warn!(error = %e, "Signal pump failed");
            }
        }
        info!("Disconnected from device bus");
    }

    async fn call_i32<B>(&self, proxy: &Proxy<'static>, method: &str, body: &B) -> Result<i32, BusError>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        proxy
            .call::<_, _, i32>(method, body)
            .await
            .map_err(|e| BusError::call_failed(method, e.to_string()))
    }
}

fn non_negative(method: &str, value: i32) -> Result<u32, BusError> {
    u32::try_from(value)
        .map_err(|_| BusError::invalid_response(method, format!("negative count {}", value)))
}

/// Number of port units: inputs and outputs share one registry.
fn port_count(inputs: i32, outputs: i32) -> Result<u32, BusError> {
    const METHOD: &str = "GetNbrPorts";
    Ok(non_negative(METHOD, inputs)? + non_negative(METHOD, outputs)?)
}

#[async_trait]
impl DeviceBus for DbusDeviceBus {
    async fn count(&self, class: DeviceClass) -> Result<u32, BusError> {
        match class {
            DeviceClass::Temperature => {
                let method = "GetNbrOfTemperatureSensors";
                let n = self.call_i32(&self.temperature, method, &()).await?;
                non_negative(method, n)
            }
            DeviceClass::Port => {
                let method = "GetNbrPorts";
                let (inputs, outputs) = self
                    .ports
                    .call::<_, _, (i32, i32)>(method, &())
                    .await
                    .map_err(|e| BusError::call_failed(method, e.to_string()))?;
                debug!(inputs, outputs, "Port counts");
                port_count(inputs, outputs)
            }
        }
    }

    async fn temperature(&self, index: u32) -> Result<f64, BusError> {
        let method = "GetTemperature";
        self.temperature
            .call::<_, _, f64>(method, &(index as i32, self.unit.as_str()))
            .await
            .map_err(|e| BusError::call_failed(method, e.to_string()))
    }

    async fn port_state(&self, index: u32) -> Result<bool, BusError> {
        let method = "GetPortState";
        self.ports
            .call::<_, _, bool>(method, &(index as i32,))
            .await
            .map_err(|e| BusError::call_failed(method, e.to_string()))
    }

    async fn subscribe(
        &self,
        class: DeviceClass,
        index: u32,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionId, BusError> {
        let id = match class {
            DeviceClass::Temperature => {
                self.call_i32(
                    &self.temperature,
                    "RegisterForTemperatureChangeSignal",
                    &(index as i32, options.temperature_threshold),
                )
                .await?
            }
            DeviceClass::Port => {
                self.call_i32(&self.ports, "RegisterForPortChanged", &(index as i32,))
                    .await?
            }
        };
        Ok(SubscriptionId::new(id as u32))
    }
}

impl std::fmt::Debug for DbusDeviceBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbusDeviceBus")
            .field("unit", &self.unit)
            .field("pumps", &self.pumps.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative("GetNbrPorts", 3).unwrap(), 3);
        assert!(matches!(
            non_negative("GetNbrPorts", -1),
            Err(BusError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_port_count_sums_inputs_and_outputs() {
        assert_eq!(port_count(1, 0).unwrap(), 1);
        assert_eq!(port_count(2, 3).unwrap(), 5);
        assert_eq!(port_count(0, 0).unwrap(), 0);
        assert!(matches!(port_count(-1, 4), Err(BusError::InvalidResponse { .. })));
        assert!(matches!(port_count(4, -2), Err(BusError::InvalidResponse { .. })));
    }
}
