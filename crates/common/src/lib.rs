// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

// WireGuard Tunnel Manager - Common Library
// Connection manager, platform commands, and shared types

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod platform;
pub mod process;
pub mod servers;
pub mod stats;
pub mod types;
pub mod view_models;

pub use config::{ConfigLocator, ManagerSettings, CONFIG_DIR_ENV};
pub use error::{Error, Result};
pub use events::{dispatch, ConnectionEventHandler};
pub use manager::ConnectionManager;
pub use platform::{CommandResolver, CommandSpec, OsFamily, PlatformCommands};
pub use process::{LaunchError, ProcessMessage, ProcessRunner};
pub use servers::{default_servers, find_server};
pub use stats::parse_transfer;
pub use types::{
    ActiveSession, ConnectionState, ManagerEvent, OperationKind, ServerDescriptor, TransferStats,
};
pub use view_models::{
    create_server_view_models, elapsed_secs, format_bytes, format_hms, status_color_for,
    status_text_for, ConnectionViewModel, ServerViewModel, StatusColor,
};
