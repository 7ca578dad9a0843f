//! Tunnel client state as seen by the dashboard.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::{ByteMetrics, HistogramSnapshot, Meter, MeterSnapshot};

/// Control connection state: the client cycles between these until exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Reconnecting,
    Online,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Online => write!(f, "online"),
        }
    }
}

/// One established tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    pub public_url: String,
    pub protocol: String,
    pub local_addr: String,
}

/// Read-only view over whatever tracks the tunnel client.
///
/// `/rest/status` is built from this on every request, so implementations
/// should return cheap copies rather than hold locks across calls.
pub trait StatusSource: Send + Sync {
    fn tunnels(&self) -> Vec<TunnelInfo>;
    fn client_version(&self) -> String;
    fn server_version(&self) -> String;
    fn connection_status(&self) -> ConnectionStatus;
    fn connection_metrics(&self) -> MeterSnapshot;
    fn bytes_in(&self) -> HistogramSnapshot;
    fn bytes_out(&self) -> HistogramSnapshot;
}

/// Shared mutable client state. Writers are the tunnel client's control and
/// proxy loops; readers are the dashboard handlers.
pub struct ClientState {
    client_version: String,
    server_version: RwLock<String>,
    status: RwLock<ConnectionStatus>,
    tunnels: RwLock<Vec<TunnelInfo>>,
    connections: Meter,
    bytes_in: ByteMetrics,
    bytes_out: ByteMetrics,
}

impl ClientState {
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
            server_version: RwLock::new(String::new()),
            status: RwLock::new(ConnectionStatus::default()),
            tunnels: RwLock::new(Vec::new()),
            connections: Meter::new(),
            bytes_in: ByteMetrics::new(),
            bytes_out: ByteMetrics::new(),
        }
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        *self
            .server_version
            .write()
            .unwrap_or_else(PoisonError::into_inner) = version.into();
    }

    /// Returns the previous status.
    pub fn set_connection_status(&self, status: ConnectionStatus) -> ConnectionStatus {
        let mut guard = self.status.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, status);
        if previous != status {
            debug!(from = %previous, to = %status, "connection status changed");
        }
        previous
    }

    pub fn set_tunnels(&self, tunnels: Vec<TunnelInfo>) {
        *self.tunnels.write().unwrap_or_else(PoisonError::into_inner) = tunnels;
    }

    /// Account for one proxied connection and the bytes it moved.
    pub fn record_connection(&self, bytes_in: u64, bytes_out: u64) {
        self.connections.mark(1);
        self.bytes_in.record(bytes_in);
        self.bytes_out.record(bytes_out);
    }
}

impl StatusSource for ClientState {
    fn tunnels(&self) -> Vec<TunnelInfo> {
        self.tunnels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn client_version(&self) -> String {
        self.client_version.clone()
    }

    fn server_version(&self) -> String {
        self.server_version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_metrics(&self) -> MeterSnapshot {
        self.connections.snapshot()
    }

    fn bytes_in(&self) -> HistogramSnapshot {
        self.bytes_in.snapshot()
    }

    fn bytes_out(&self) -> HistogramSnapshot {
        self.bytes_out.snapshot()
    }
}
