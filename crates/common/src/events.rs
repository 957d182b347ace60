// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

//! Callback-style consumption of manager events

use crate::types::{ConnectionState, ManagerEvent, TransferStats};

/// Framework-agnostic event handler trait
///
/// Front ends that prefer callbacks over draining a broadcast receiver
/// implement this and feed each received event to [`dispatch`].
pub trait ConnectionEventHandler {
    /// Called on every state transition
    fn on_status_changed(&mut self, state: ConnectionState, message: &str);

    /// Called after each successful poll cycle
    fn on_stats_updated(&mut self, stats: TransferStats);

    /// Called for process output and status messages (optional)
    fn on_log_line(&mut self, _line: &str) {}
}

/// Route one event to the matching handler method
pub fn dispatch<H>(handler: &mut H, event: &ManagerEvent)
where
    H: ConnectionEventHandler + ?Sized,
{
    match event {
        ManagerEvent::StatusChanged { state, message } => {
            handler.on_status_changed(*state, message)
        }
        ManagerEvent::StatsUpdated(stats) => handler.on_stats_updated(*stats),
        ManagerEvent::Log { line } => handler.on_log_line(line),
    }
}
