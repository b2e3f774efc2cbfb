// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA model server built on the `opcua` crate.
//!
//! Each [`OpcUaModelServer`] wraps one `opcua` server instance with an
//! anonymous, unsecured endpoint on `host:port`. Provisioned variables live
//! under the Objects folder in the configured namespace, with a string node
//! id equal to the label.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opcua::server::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uabridge_config::ServerConfig;
use uabridge_core::{Label, ModelServer, NodeValue, ServerError, ServerFactory};

use crate::convert;

/// Time allowed for the server task to exit after an abort.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// OpcUaSettings
// =============================================================================

/// Settings shared by every server instance.
#[derive(Debug, Clone)]
pub struct OpcUaSettings {
    /// Listen address.
    pub host: String,
    /// Application name.
    pub application_name: String,
    /// Application URI.
    pub application_uri: String,
    /// Namespace URI of the provisioned nodes.
    pub namespace_uri: String,
    /// PKI directory.
    pub pki_dir: std::path::PathBuf,
}

impl From<&ServerConfig> for OpcUaSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            application_name: config.application_name.clone(),
            application_uri: config.application_uri.clone(),
            namespace_uri: config.namespace_uri.clone(),
            pki_dir: config.pki_dir.clone(),
        }
    }
}

// =============================================================================
// OpcUaModelServer
// =============================================================================

struct NodeEntry {
    node_id: NodeId,
    value: NodeValue,
}

/// A model server exposing its nodes over OPC UA.
pub struct OpcUaModelServer {
    port: u16,
    namespace: u16,
    server: Arc<OpcUaRwLock<Server>>,
    address_space: Arc<OpcUaRwLock<AddressSpace>>,
    nodes: Mutex<HashMap<Label, NodeEntry>>,
}

impl OpcUaModelServer {
    /// Builds a server instance for `port`.
    ///
    /// Nothing is bound until [`ModelServer::run`] is called.
    pub fn new(settings: &OpcUaSettings, port: u16) -> Result<Self, ServerError> {
        let server = ServerBuilder::new_anonymous(settings.application_name.clone())
            .application_uri(settings.application_uri.clone())
            .product_uri(settings.application_uri.clone())
            .host_and_port(settings.host.clone(), port)
            .discovery_urls(vec![format!("opc.tcp://{}:{}/", settings.host, port)])
            .pki_dir(settings.pki_dir.clone())
            .create_sample_keypair(true)
            .server()
            .ok_or_else(|| ServerError::create(port, "invalid server configuration"))?;

        let address_space = server.address_space();
        let namespace = address_space
            .write()
            .register_namespace(&settings.namespace_uri)
            .map_err(|_| {
                ServerError::create(
                    port,
                    format!("cannot register namespace '{}'", settings.namespace_uri),
                )
            })?;

        debug!(port, namespace, uri = %settings.namespace_uri, "OPC UA server created");

        Ok(Self {
            port,
            namespace,
            server: Arc::new(OpcUaRwLock::new(server)),
            address_space,
            nodes: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the namespace index of the provisioned nodes.
    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    /// Returns the node id of `label`, if provisioned.
    pub fn node_id(&self, label: &Label) -> Option<NodeId> {
        self.nodes.lock().get(label).map(|e| e.node_id.clone())
    }
}

#[async_trait]
impl ModelServer for OpcUaModelServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn add_variable(&self, label: &Label, initial: NodeValue) -> Result<(), ServerError> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(label) {
            return Err(ServerError::NodeExists {
                label: label.clone(),
            });
        }

        let node_id = convert::node_id(self.namespace, label);
        let inserted = {
            let mut space = self.address_space.write();
            VariableBuilder::new(&node_id, label.as_str(), label.as_str())
                .data_type(convert::data_type(initial.value_type()))
                .value(convert::to_variant(initial))
                .organized_by(ObjectId::ObjectsFolder)
                .insert(&mut space)
        };
        if !inserted {
            return Err(ServerError::NodeExists {
                label: label.clone(),
            });
        }

        nodes.insert(
            label.clone(),
            NodeEntry {
                node_id,
                value: initial,
            },
        );
        Ok(())
    }

    fn write_value(&self, label: &Label, value: NodeValue) -> Result<(), ServerError> {
        let mut nodes = self.nodes.lock();
        let entry = nodes
            .get_mut(label)
            .ok_or_else(|| ServerError::node_not_found(label))?;

        if entry.value.value_type() != value.value_type() {
            return Err(ServerError::TypeMismatch {
                label: label.clone(),
                expected: entry.value.value_type(),
                actual: value.value_type(),
            });
        }

        let now = DateTime::now();
        let written = self.address_space.write().set_variable_value(
            entry.node_id.clone(),
            convert::to_variant(value),
            &now,
            &now,
        );
        if !written {
            return Err(ServerError::node_not_found(label));
        }

        entry.value = value;
        Ok(())
    }

    fn read_value(&self, label: &Label) -> Result<NodeValue, ServerError> {
        self.nodes
            .lock()
            .get(label)
            .map(|e| e.value)
            .ok_or_else(|| ServerError::node_not_found(label))
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!(port = self.port, "OPC UA server listening");

        let task = Server::new_server_task(self.server.clone());
        tokio::pin!(task);

        tokio::select! {
            _ = &mut task => {
                error!(port = self.port, "OPC UA server task exited unexpectedly");
                return Err(ServerError::run("server task exited"));
            }
            _ = shutdown.cancelled() => {}
        }

        debug!(port = self.port, "Aborting OPC UA server");
        self.server.write().abort();

        if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
            warn!(port = self.port, "OPC UA server did not stop in time");
            return Err(ServerError::run("server did not stop in time"));
        }

        info!(port = self.port, "OPC UA server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for OpcUaModelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaModelServer")
            .field("port", &self.port)
            .field("namespace", &self.namespace)
            .field("nodes", &self.nodes.lock().len())
            .finish()
    }
}

// =============================================================================
// OpcUaServerFactory
// =============================================================================

/// Creates [`OpcUaModelServer`]s from shared settings.
#[derive(Debug, Clone)]
pub struct OpcUaServerFactory {
    settings: OpcUaSettings,
}

impl OpcUaServerFactory {
    /// Creates a factory.
    pub fn new(settings: OpcUaSettings) -> Self {
        Self { settings }
    }

    /// Returns the factory settings.
    pub fn settings(&self) -> &OpcUaSettings {
        &self.settings
    }
}

impl ServerFactory for OpcUaServerFactory {
    fn create(&self, port: u16) -> Result<Arc<dyn ModelServer>, ServerError> {
        Ok(Arc::new(OpcUaModelServer::new(&self.settings, port)?))
    }
}
