// Common types for WireGuard Tunnel Manager

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// State of the tunnel connection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,  // no tunnel, nothing running
    Connecting,    // up command running
    Connected,     // tunnel up, stats poll armed
    Disconnecting, // down command running
    Error,         // last operation failed, see message
}

impl ConnectionState {
    /// Check if the state represents an active tunnel
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if the state represents a transitional state
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }

    /// States from which a new connect attempt is accepted
    pub fn accepts_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// A selectable server location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Display name, e.g. "United States"
    pub display_name: String,
    /// Two-letter country code, e.g. "us"
    pub country_code: String,
    /// Flag glyph shown next to the name
    pub glyph: String,
    /// Tunnel identifier: interface name and config file stem, e.g. "dkt-us"
    pub tunnel_id: String,
}

impl ServerDescriptor {
    pub fn new(
        display_name: impl Into<String>,
        country_code: impl Into<String>,
        glyph: impl Into<String>,
        tunnel_id: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            country_code: country_code.into(),
            glyph: glyph.into(),
            tunnel_id: tunnel_id.into(),
        }
    }
}

/// Identity of the tunnel the manager is driving.
///
/// Created when a connect attempt starts, dropped after a clean disconnect.
/// A disconnect that exits non-zero keeps it so the disconnect can be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub server_name: String,
    pub tunnel_id: String,
    pub config_file: PathBuf,
    /// Set when the up command succeeded
    pub connected_at: Option<DateTime<Local>>,
}

/// Transfer counters parsed from one poll cycle
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl TransferStats {
    pub fn new(bytes_received: u64, bytes_sent: u64) -> Self {
        Self {
            bytes_received,
            bytes_sent,
        }
    }
}

/// Logical operation a child process belongs to.
///
/// At most one child per kind is alive at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    Disconnect,
    StatsPoll,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Connect => "connect",
            OperationKind::Disconnect => "disconnect",
            OperationKind::StatsPoll => "stats",
        };
        f.write_str(name)
    }
}

/// Events emitted by the connection manager, in production order
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagerEvent {
    /// Every state transition, with a human readable message (may be empty)
    StatusChanged {
        state: ConnectionState,
        message: String,
    },

    /// Counters from a successful poll cycle, zero when nothing matched
    StatsUpdated(TransferStats),

    /// A line for the log pane: process output or a status message
    Log { line: String },
}
