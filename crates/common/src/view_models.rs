// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

//! View models - Data prepared for display by front ends

use std::path::PathBuf;

use chrono::{Local, NaiveTime};

use crate::config::ConfigLocator;
use crate::manager::ConnectionManager;
use crate::types::{ConnectionState, ServerDescriptor};

const SECONDS_PER_DAY: i64 = 86_400;

/// Placeholder for values that are not known yet
pub const PLACEHOLDER: &str = "—";

/// Status color for UI indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green, // Connected
    Amber, // Connecting, Disconnecting
    Red,   // Error
    Gray,  // Disconnected
}

impl StatusColor {
    /// CSS-style hex value of the color
    pub fn hex(&self) -> &'static str {
        match self {
            StatusColor::Green => "#22c55e",
            StatusColor::Amber => "#f59e0b",
            StatusColor::Red => "#ef4444",
            StatusColor::Gray => "#6b7280",
        }
    }
}

pub fn status_color_for(state: ConnectionState) -> StatusColor {
    match state {
        ConnectionState::Connected => StatusColor::Green,
        ConnectionState::Connecting | ConnectionState::Disconnecting => StatusColor::Amber,
        ConnectionState::Error => StatusColor::Red,
        ConnectionState::Disconnected => StatusColor::Gray,
    }
}

/// Get human-readable status text
pub fn status_text_for(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "Disconnected",
        ConnectionState::Connecting => "Connecting…",
        ConnectionState::Connected => "Connected",
        ConnectionState::Disconnecting => "Disconnecting…",
        ConnectionState::Error => "Error",
    }
}

/// Human readable byte count: B, KiB with one decimal, MiB and GiB with two
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    }
}

/// Seconds from `start` to `now` on a 24-hour clock.
///
/// A `now` earlier than `start` means midnight passed in between.
pub fn elapsed_secs(start: NaiveTime, now: NaiveTime) -> u64 {
    let mut elapsed = now.signed_duration_since(start).num_seconds();
    if elapsed < 0 {
        elapsed += SECONDS_PER_DAY;
    }
    elapsed as u64
}

/// Format seconds as `HH:MM:SS`
pub fn format_hms(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Snapshot of the manager prepared for a status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionViewModel {
    pub state: ConnectionState,
    pub status_color: StatusColor,
    pub status_text: String,
    pub server_name: Option<String>,
    pub received: String,
    pub sent: String,
    pub elapsed: String,
    pub can_connect: bool,
    pub can_disconnect: bool,
}

impl ConnectionViewModel {
    pub fn from_manager(manager: &ConnectionManager) -> Self {
        Self::build(manager, Local::now().time())
    }

    fn build(manager: &ConnectionManager, now: NaiveTime) -> Self {
        let state = manager.state();
        let (received, sent) = match manager.stats() {
            Some(stats) => (
                format_bytes(stats.bytes_received),
                format_bytes(stats.bytes_sent),
            ),
            None => (PLACEHOLDER.to_string(), PLACEHOLDER.to_string()),
        };

        let elapsed = manager
            .session()
            .and_then(|session| session.connected_at)
            .filter(|_| state.is_connected())
            .map(|at| format_hms(elapsed_secs(at.time(), now)))
            .unwrap_or_else(|| PLACEHOLDER.to_string());

        Self {
            state,
            status_color: status_color_for(state),
            status_text: status_text_for(state).to_string(),
            server_name: manager.current_server_name().map(str::to_string),
            received,
            sent,
            elapsed,
            can_connect: state.accepts_connect(),
            can_disconnect: state == ConnectionState::Connected
                || (state == ConnectionState::Error && manager.session().is_some()),
        }
    }
}

/// Server catalog entry with its config availability
#[derive(Debug, Clone)]
pub struct ServerViewModel {
    pub label: String,
    pub country_code: String,
    pub tunnel_id: String,
    pub config_file: Option<PathBuf>,
}

impl ServerViewModel {
    pub fn from_server(server: &ServerDescriptor, locator: &ConfigLocator) -> Self {
        Self {
            label: format!("{}  {}", server.glyph, server.display_name),
            country_code: server.country_code.to_uppercase(),
            tunnel_id: server.tunnel_id.clone(),
            config_file: locator.resolve(&server.tunnel_id),
        }
    }

    pub fn has_config(&self) -> bool {
        self.config_file.is_some()
    }
}

/// Create view models for every server in the catalog
pub fn create_server_view_models(
    servers: &[ServerDescriptor],
    locator: &ConfigLocator,
) -> Vec<ServerViewModel> {
    servers
        .iter()
        .map(|server| ServerViewModel::from_server(server, locator))
        .collect()
}
