use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{GraphClient, GraphPort, GraphSnapshot, PortDirection, PortType};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to connect to audio server: {0}")]
    ServerUnavailable(String),
    #[error("no such port: {0}")]
    NoSuchPort(String),
    #[error("audio server rejected the request: {0}")]
    Rejected(String),
}

/// Result of a connect request: whether a new edge was made, or the
/// pair was already wired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

/// Queries and patches the audio kernel's port graph. Every call opens
/// (or reuses) a passive client — one that never registers its own
/// ports or process callback — since the adapter only ever inspects and
/// rewires ports owned by other clients (the transport processes).
pub struct AudioGraphAdapter {
    client_name: String,
}

impl AudioGraphAdapter {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn connect(&self) -> Result<jack::Client, GraphError> {
        let (client, _status) = jack::Client::new(&self.client_name, jack::ClientOptions::NO_START_SERVER)
            .map_err(|e| GraphError::ServerUnavailable(e.to_string()))?;
        Ok(client)
    }

    /// Enumerate every port currently registered with the audio kernel,
    /// grouped by owning client, with each port's live connection list.
    /// Runs on a blocking thread: the `jack` crate's client calls are
    /// synchronous FFI and must not run on the async executor.
    pub async fn snapshot(&self) -> Result<GraphSnapshot, GraphError> {
        let client_name = self.client_name.clone();
        tokio::task::spawn_blocking(move || Self { client_name }.snapshot_blocking())
            .await
            .expect("snapshot task panicked")
    }

    fn snapshot_blocking(&self) -> Result<GraphSnapshot, GraphError> {
        let client = self.connect()?;
        let port_names = client.ports(None, None, jack::PortFlags::empty());

        let mut clients: BTreeMap<String, Vec<GraphPort>> = BTreeMap::new();

        for full_name in port_names {
            let Some(port) = client.port_by_name(&full_name) else {
                continue;
            };
            let flags = port.flags();
            let direction = if flags.contains(jack::PortFlags::IS_OUTPUT) {
                PortDirection::Output
            } else {
                PortDirection::Input
            };
            let port_type = match port.port_type() {
                Ok(t) if t.to_lowercase().contains("midi") => PortType::Midi,
                _ => PortType::Audio,
            };
            let connections = port.connections().unwrap_or_default();

            let (owner, short_name) = full_name
                .split_once(':')
                .unwrap_or((full_name.as_str(), full_name.as_str()));

            clients.entry(owner.to_string()).or_default().push(GraphPort {
                name: short_name.to_string(),
                direction,
                port_type,
                connections,
            });
        }

        Ok(GraphSnapshot {
            clients: clients
                .into_iter()
                .map(|(name, ports)| GraphClient { name, ports })
                .collect(),
        })
    }

    /// Connect one output port to one input port by fully-qualified name
    /// (`client:port`). Idempotent: connecting an already-connected pair
    /// is not an error, but is reported distinctly so callers can skip
    /// re-announcing an edge that already existed.
    pub async fn connect_ports(&self, source: &str, dest: &str) -> Result<ConnectOutcome, GraphError> {
        let (source, dest) = (source.to_string(), dest.to_string());
        let client_name = self.client_name.clone();
        tokio::task::spawn_blocking(move || {
            let adapter = Self { client_name };
            let client = adapter.connect()?;
            match client.connect_ports_by_name(&source, &dest) {
                Ok(()) => Ok(ConnectOutcome::Connected),
                Err(e) if e.to_string().to_lowercase().contains("already connected") => {
                    Ok(ConnectOutcome::AlreadyConnected)
                }
                Err(e) => Err(GraphError::Rejected(e.to_string())),
            }
        })
        .await
        .expect("connect task panicked")
    }

    pub async fn disconnect_ports(&self, source: &str, dest: &str) -> Result<(), GraphError> {
        let (source, dest) = (source.to_string(), dest.to_string());
        let client_name = self.client_name.clone();
        tokio::task::spawn_blocking(move || {
            let adapter = Self { client_name };
            let client = adapter.connect()?;
            client
                .disconnect_ports_by_name(&source, &dest)
                .map_err(|e| GraphError::Rejected(e.to_string()))
        })
        .await
        .expect("disconnect task panicked")
    }
}
