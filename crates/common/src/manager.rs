// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

// WireGuard Tunnel Manager - Connection Manager
// Drives connect/disconnect/stats commands and owns the connection state

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLocator, ManagerSettings};
use crate::error::Error;
use crate::platform::{CommandResolver, CommandSpec, PlatformCommands};
use crate::process::{LaunchError, ProcessMessage, ProcessRunner};
use crate::stats::parse_transfer;
use crate::types::{
    ActiveSession, ConnectionState, ManagerEvent, OperationKind, ServerDescriptor, TransferStats,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A live child process and what it has printed so far
struct RunSlot {
    run_id: u64,
    runner: ProcessRunner,
    program: String,
    output: String,
    /// Set on a stats query still running when the manager left Connected
    discard_result: bool,
}

/// Owns the connection state machine for a single tunnel.
///
/// All mutation happens on the task that calls [`connect`](Self::connect),
/// [`disconnect`](Self::disconnect) and [`step`](Self::step). Child process
/// notifications queue up on an internal channel until `step` applies them.
pub struct ConnectionManager {
    resolver: Box<dyn CommandResolver>,
    locator: ConfigLocator,
    settings: ManagerSettings,
    state: ConnectionState,
    session: Option<ActiveSession>,
    stats: Option<TransferStats>,
    /// At most one live child per operation kind
    runs: HashMap<OperationKind, RunSlot>,
    next_run_id: u64,
    /// Armed only while Connected
    poll: Option<Interval>,
    process_tx: mpsc::UnboundedSender<ProcessMessage>,
    process_rx: mpsc::UnboundedReceiver<ProcessMessage>,
    event_tx: broadcast::Sender<ManagerEvent>,
}

impl ConnectionManager {
    pub fn new(
        resolver: Box<dyn CommandResolver>,
        locator: ConfigLocator,
        settings: ManagerSettings,
    ) -> Self {
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            resolver,
            locator,
            settings,
            state: ConnectionState::Disconnected,
            session: None,
            stats: None,
            runs: HashMap::new(),
            next_run_id: 0,
            poll: None,
            process_tx,
            process_rx,
            event_tx,
        }
    }

    /// Manager for the running platform, locating configs from the environment
    pub fn with_defaults(settings: ManagerSettings) -> Self {
        Self::new(
            Box::new(PlatformCommands::detect()),
            ConfigLocator::from_env(),
            settings,
        )
    }

    /// Subscribe to manager events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Display name of the server being driven, if any
    pub fn current_server_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.server_name.as_str())
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    /// Counters from the latest poll, `None` until one completes
    pub fn stats(&self) -> Option<TransferStats> {
        self.stats
    }

    /// Directory users should place tunnel configs in
    pub fn config_directory(&self) -> PathBuf {
        self.locator.config_directory()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    /// Whether a child of `kind` is alive
    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.runs.contains_key(&kind)
    }

    /// Start bringing up the tunnel for `server`.
    ///
    /// Ignored unless Disconnected or Error. Returns once the command is
    /// launched; the outcome arrives through [`step`](Self::step).
    pub async fn connect(&mut self, server: &ServerDescriptor) {
        if !self.state.accepts_connect() {
            debug!(
                "Ignoring connect to {} while {}",
                server.display_name, self.state
            );
            return;
        }

        if let Some(previous) = self.session.take() {
            warn!(
                "Dropping unresolved session for {} to connect to {}",
                previous.tunnel_id, server.tunnel_id
            );
        }
        self.stats = None;

        let Some(config_file) = self.locator.resolve(&server.tunnel_id) else {
            self.fail(Error::ConfigNotFound {
                server: server.display_name.clone(),
                tunnel_id: server.tunnel_id.clone(),
            });
            return;
        };

        let command = self
            .resolver
            .connect_command(&server.tunnel_id, &config_file);

        self.session = Some(ActiveSession {
            server_name: server.display_name.clone(),
            tunnel_id: server.tunnel_id.clone(),
            config_file,
            connected_at: None,
        });
        self.set_state(
            ConnectionState::Connecting,
            format!("Connecting to {}…", server.display_name),
        );

        self.launch(OperationKind::Connect, command).await;
    }

    /// Start taking the tunnel down.
    ///
    /// Accepted while Connected, and in Error when a failed disconnect left
    /// the session behind so it can be retried. Ignored otherwise.
    pub async fn disconnect(&mut self) {
        let accepted = match self.state {
            ConnectionState::Connected => true,
            ConnectionState::Error => self.session.is_some(),
            _ => false,
        };
        if !accepted {
            debug!("Ignoring disconnect while {}", self.state);
            return;
        }

        let Some(session) = &self.session else {
            return;
        };
        let command = self
            .resolver
            .disconnect_command(&session.tunnel_id, &session.config_file);

        self.set_state(ConnectionState::Disconnecting, "Disconnecting…");
        self.launch(OperationKind::Disconnect, command).await;
    }

    /// Wait for the next process notification or poll tick and apply it.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    pub async fn step(&mut self) {
        tokio::select! {
            Some(message) = self.process_rx.recv() => {
                self.handle_process_message(message);
            }
            _ = next_tick(&mut self.poll) => {
                self.poll_stats().await;
            }
        }
    }

    /// Apply process notifications until no connect or disconnect is in flight.
    ///
    /// Returns `false` when `limit` elapsed first.
    pub async fn settle(&mut self, limit: Duration) -> bool {
        let wait = async {
            while self.state.is_in_progress() {
                self.step().await;
            }
        };
        timeout(limit, wait).await.is_ok()
    }

    /// Bring the tunnel down and release every child.
    ///
    /// A connect still running is allowed to finish first, so an interface
    /// that came up is taken down again. Each wait is bounded by `limit`.
    /// Returns the state the manager ended in; anything other than
    /// Disconnected means the tunnel needs checking by hand.
    pub async fn close(&mut self, limit: Duration) -> ConnectionState {
        if !self.settle(limit).await {
            warn!("Still {} after {:?}, giving up", self.state, limit);
        } else if self.state == ConnectionState::Connected {
            self.disconnect().await;
            if !self.settle(limit).await {
                warn!("Still {} after {:?}, giving up", self.state, limit);
            }
        }

        let state = self.state;
        self.shutdown().await;
        state
    }

    /// Stop polling and terminate every live child, each within the kill grace
    pub async fn shutdown(&mut self) {
        self.poll = None;

        let grace = self.settings.kill_grace();
        for (kind, slot) in self.runs.drain() {
            debug!("Terminating {} run {}", kind, slot.run_id);
            slot.runner.terminate(grace).await;
        }
    }

    async fn launch(&mut self, kind: OperationKind, command: CommandSpec) {
        if let Some(previous) = self.runs.remove(&kind) {
            warn!(
                "Replacing running {} run {}, terminating it first",
                kind, previous.run_id
            );
            previous.runner.terminate(self.settings.kill_grace()).await;
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        debug!("Launching {} run {}: {}", kind, run_id, command);

        let runner = ProcessRunner::start(
            kind,
            run_id,
            &command,
            self.settings.output_drain(),
            self.process_tx.clone(),
        );

        self.runs.insert(
            kind,
            RunSlot {
                run_id,
                runner,
                program: command.program,
                output: String::new(),
                discard_result: false,
            },
        );
    }

    fn handle_process_message(&mut self, message: ProcessMessage) {
        let (kind, run_id) = message.origin();
        let current = self.runs.get(&kind).map(|slot| slot.run_id) == Some(run_id);
        if !current {
            debug!("Discarding message from superseded {} run {}", kind, run_id);
            return;
        }

        match message {
            ProcessMessage::Output { chunk, .. } => {
                if let Some(slot) = self.runs.get_mut(&kind) {
                    slot.output.push_str(&chunk);
                }
                if kind != OperationKind::StatsPoll {
                    self.emit_output(&chunk);
                }
            }
            ProcessMessage::Exited { code, .. } => {
                if let Some(slot) = self.runs.remove(&kind) {
                    self.on_exited(kind, code, slot);
                }
            }
            ProcessMessage::Failed { error, .. } => {
                if let Some(slot) = self.runs.remove(&kind) {
                    self.on_launch_error(kind, slot, error);
                }
            }
        }
    }

    fn on_exited(&mut self, kind: OperationKind, code: i32, slot: RunSlot) {
        match kind {
            OperationKind::Connect => {
                if self.state != ConnectionState::Connecting {
                    debug!("Connect finished while {}, ignoring", self.state);
                    return;
                }
                if code != 0 {
                    self.session = None;
                    self.fail(Error::NonZeroExit {
                        code,
                        output: slot.output.trim().to_string(),
                    });
                    return;
                }

                let server_name = match self.session.as_mut() {
                    Some(session) => {
                        session.connected_at = Some(Local::now());
                        session.server_name.clone()
                    }
                    None => String::new(),
                };
                self.set_state(
                    ConnectionState::Connected,
                    format!("Connected to {}", server_name),
                );
                self.arm_poll();
            }
            OperationKind::Disconnect => {
                if self.state != ConnectionState::Disconnecting {
                    debug!("Disconnect finished while {}, ignoring", self.state);
                    return;
                }
                if code != 0 {
                    // Session stays so the disconnect can be retried
                    self.fail(Error::DisconnectAmbiguous { code });
                    return;
                }

                self.session = None;
                self.stats = None;
                self.set_state(ConnectionState::Disconnected, "Disconnected");
            }
            OperationKind::StatsPoll => {
                if slot.discard_result || self.state != ConnectionState::Connected {
                    debug!("Discarding stats from run {}, no longer connected", slot.run_id);
                    return;
                }
                if code != 0 {
                    warn!("Stats query exited with code {}", code);
                    return;
                }

                let stats = parse_transfer(&slot.output);
                self.stats = Some(stats);
                self.emit(ManagerEvent::StatsUpdated(stats));
            }
        }
    }

    fn on_launch_error(&mut self, kind: OperationKind, slot: RunSlot, reason: LaunchError) {
        let err = Error::launch(slot.program, reason);

        match kind {
            OperationKind::Connect if self.state == ConnectionState::Connecting => {
                self.session = None;
                self.fail(err);
            }
            OperationKind::Disconnect if self.state == ConnectionState::Disconnecting => {
                self.fail(err);
            }
            OperationKind::StatsPoll => {
                warn!("Stats query failed: {}", err);
            }
            _ => debug!("{} failed while {}, ignoring: {}", kind, self.state, err),
        }
    }

    async fn poll_stats(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if self.runs.contains_key(&OperationKind::StatsPoll) {
            debug!("Previous stats query still running, skipping tick");
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        let command = self.resolver.stats_command(&session.tunnel_id);
        self.launch(OperationKind::StatsPoll, command).await;
    }

    fn arm_poll(&mut self) {
        let period = self.settings.poll_interval();
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.poll = Some(poll);
        debug!("Stats polling every {:?}", period);
    }

    fn set_state(&mut self, state: ConnectionState, message: impl Into<String>) {
        let message = message.into();

        if state != ConnectionState::Connected {
            if self.poll.take().is_some() {
                debug!("Stats polling stopped");
            }
            if let Some(slot) = self.runs.get_mut(&OperationKind::StatsPoll) {
                slot.discard_result = true;
            }
        }

        info!("{} -> {}", self.state, state);
        self.state = state;
        self.emit(ManagerEvent::StatusChanged {
            state,
            message: message.clone(),
        });
        if !message.is_empty() {
            self.emit(ManagerEvent::Log { line: message });
        }
    }

    fn fail(&mut self, err: Error) {
        error!("{}", err);
        self.set_state(ConnectionState::Error, err.to_string());
    }

    fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn emit_output(&self, chunk: &str) {
        for line in chunk.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.emit(ManagerEvent::Log {
                line: line.to_string(),
            });
        }
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
