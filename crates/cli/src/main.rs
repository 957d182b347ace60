// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

// WireGuard Tunnel Manager - CLI Client
// Command-line front end for connecting to WireGuard servers

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveTime};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use wg_tunnel_common::{
    create_server_view_models, default_servers, dispatch, elapsed_secs, find_server,
    format_bytes, format_hms, parse_transfer, status_color_for, status_text_for,
    CommandResolver, ConfigLocator, ConnectionEventHandler, ConnectionManager, ConnectionState,
    ManagerEvent, ManagerSettings, PlatformCommands, ServerDescriptor, StatusColor,
    TransferStats, CONFIG_DIR_ENV,
};

/// Upper bound on each teardown wait after Ctrl+C
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "wg-tunnel")]
#[command(about = "WireGuard Tunnel Manager CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available servers and whether their configs are present
    Servers {
        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },

    /// Show where tunnel configs are looked up
    ConfigDir,

    /// Connect to a server and stay connected until Ctrl+C
    Connect {
        /// Tunnel id or country code, e.g. dkt-us or us
        server: String,

        /// Print events as JSON lines
        #[arg(short, long)]
        json: bool,
    },

    /// Query transfer counters of a running tunnel once
    Stats {
        /// Tunnel id or country code
        server: String,

        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wg_tunnel=info,wg_tunnel_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Servers { json } => list_servers(json)?,
        Commands::ConfigDir => show_config_dir(),
        Commands::Connect { server, json } => connect(server, json).await?,
        Commands::Stats { server, json } => show_stats(server, json).await?,
    }

    Ok(())
}

fn lookup_server(key: &str) -> Result<ServerDescriptor> {
    find_server(key).with_context(|| {
        format!(
            "Unknown server '{}'. Run 'wg-tunnel servers' to see the list.",
            key
        )
    })
}

fn load_settings() -> Result<ManagerSettings> {
    let path = ManagerSettings::settings_path()?;
    ManagerSettings::load_from(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn list_servers(json: bool) -> Result<()> {
    let servers = default_servers();

    if json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    let locator = ConfigLocator::from_env();
    let view_models = create_server_view_models(&servers, &locator);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Code").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Server").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Tunnel").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Config").add_attribute(Attribute::Bold).fg(Color::Cyan),
    ]);

    for vm in &view_models {
        let config_cell = match &vm.config_file {
            Some(path) => Cell::new(path.display()).fg(Color::Green),
            None => Cell::new("missing").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&vm.country_code),
            Cell::new(&vm.label),
            Cell::new(&vm.tunnel_id),
            config_cell,
        ]);
    }

    println!("{}", table);

    if !view_models.iter().any(|vm| vm.has_config()) {
        println!();
        println!("{}", "No tunnel configs found.".yellow());
        println!(
            "Copy a template to {} as <tunnel>.conf, or run {} for the search order.",
            locator.config_directory().display().to_string().cyan(),
            "wg-tunnel config-dir".cyan()
        );
    }

    Ok(())
}

fn show_config_dir() {
    let locator = ConfigLocator::from_env();

    println!("{}", locator.config_directory().display());
    println!();
    println!("{}", "Search order:".bold());
    for (i, dir) in locator.search_dirs().iter().enumerate() {
        let marker = if dir.is_dir() {
            "✓".green()
        } else {
            "✗".dimmed()
        };
        println!("  {}. {} {}", i + 1, marker, dir.display());
    }
    println!();
    println!(
        "{}",
        format!("Set {} to override the first entry.", CONFIG_DIR_ENV).dimmed()
    );
}

async fn connect(server_key: String, json: bool) -> Result<()> {
    let server = lookup_server(&server_key)?;
    let settings = load_settings()?;

    let mut manager = ConnectionManager::with_defaults(settings);
    let mut events = manager.subscribe();
    let mut printer = EventPrinter::new(json);

    info!("Connecting to {} ({})", server.display_name, server.tunnel_id);
    manager.connect(&server).await;
    pump_events(&mut events, &mut printer);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if manager.state() == ConnectionState::Error {
            manager.shutdown().await;
            bail!("Could not connect to {}", server.display_name);
        }

        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = manager.step() => {}
        }
        pump_events(&mut events, &mut printer);
    }

    if !printer.json {
        println!();
    }

    // Keep printing while the tunnel winds down
    let close = manager.close(TEARDOWN_TIMEOUT);
    tokio::pin!(close);
    let final_state = loop {
        tokio::select! {
            state = &mut close => break state,
            Ok(event) = events.recv() => printer.handle(&event),
        }
    };
    pump_events(&mut events, &mut printer);

    match final_state {
        ConnectionState::Disconnected => Ok(()),
        ConnectionState::Error => {
            bail!("Disconnect from {} did not complete cleanly", server.display_name)
        }
        state => bail!(
            "Tunnel {} was still {} when the manager stopped. Check its status manually.",
            server.tunnel_id,
            state
        ),
    }
}

async fn show_stats(server_key: String, json: bool) -> Result<()> {
    let server = lookup_server(&server_key)?;
    let command = PlatformCommands::detect().stats_command(&server.tunnel_id);

    let output = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", command))?;

    let text = merged_output(&output.stdout, &output.stderr);

    if !output.status.success() {
        bail!("{} failed ({}): {}", command, output.status, text.trim());
    }

    let stats = parse_transfer(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{} {}", server.glyph, server.display_name.bold());
        println!("  Received: {}", format_bytes(stats.bytes_received).green());
        println!("  Sent:     {}", format_bytes(stats.bytes_sent).cyan());
    }

    Ok(())
}

/// stdout followed by stderr, matching what the manager reads from a child
fn merged_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// Drain everything the manager has published so far
fn pump_events(events: &mut broadcast::Receiver<ManagerEvent>, printer: &mut EventPrinter) {
    loop {
        match events.try_recv() {
            Ok(event) => printer.handle(&event),
            Err(TryRecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

/// Terminal output for manager events
struct EventPrinter {
    json: bool,
    connected_at: Option<NaiveTime>,
    last_status_message: Option<String>,
}

impl EventPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            connected_at: None,
            last_status_message: None,
        }
    }

    fn handle(&mut self, event: &ManagerEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
            return;
        }
        dispatch(self, event);
    }
}

impl ConnectionEventHandler for EventPrinter {
    fn on_status_changed(&mut self, state: ConnectionState, message: &str) {
        self.connected_at = match state {
            ConnectionState::Connected => Some(Local::now().time()),
            _ => None,
        };

        let text = status_text_for(state);
        let dot = match status_color_for(state) {
            StatusColor::Green => "●".green(),
            StatusColor::Amber => "●".yellow(),
            StatusColor::Red => "●".red(),
            StatusColor::Gray => "●".dimmed(),
        };

        if message.is_empty() || message == text {
            println!("{} {}", dot, text.bold());
        } else if state == ConnectionState::Error {
            println!("{} {}", dot, text.bold());
            println!("{}", message.red());
        } else {
            println!("{} {}  {}", dot, text.bold(), message);
        }
        self.last_status_message = Some(message.to_string());
    }

    fn on_stats_updated(&mut self, stats: TransferStats) {
        let elapsed = self
            .connected_at
            .map(|start| format_hms(elapsed_secs(start, Local::now().time())))
            .unwrap_or_else(|| "—".to_string());

        println!(
            "  {} {}   {} {}   {}",
            "↓".green(),
            format_bytes(stats.bytes_received),
            "↑".cyan(),
            format_bytes(stats.bytes_sent),
            elapsed.dimmed()
        );
    }

    fn on_log_line(&mut self, line: &str) {
        // Status messages are already shown by on_status_changed
        if self.last_status_message.as_deref() == Some(line) {
            return;
        }
        println!("  {}", line.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_read_from_either_stream() {
        let line = b"  transfer: 1.50 MiB received, 2.00 KiB sent\n";

        let from_stderr = parse_transfer(&merged_output(b"interface: dkt-fr\n", line));
        assert_eq!(from_stderr, TransferStats::new(1_572_864, 2048));

        let from_stdout = parse_transfer(&merged_output(line, b""));
        assert_eq!(from_stdout, from_stderr);
    }

    #[test]
    fn test_merged_output_keeps_both_streams() {
        let text = merged_output(b"out\n", b"Unable to access interface: No such device\n");
        assert!(text.starts_with("out\n"));
        assert!(text.contains("No such device"));
    }
}
