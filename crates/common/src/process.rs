// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

//! Child process supervision
//!
//! A [`ProcessRunner`] owns one external command. Everything it observes
//! (output chunks, exit, launch failure) is forwarded as a [`ProcessMessage`]
//! tagged with the operation kind and a run id, so the owner can tell a
//! current run from a superseded one.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::platform::CommandSpec;
use crate::types::OperationKind;

/// Why a child could not be run to a normal exit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("program not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("process crashed")]
    Crashed,

    #[error("{0}")]
    Other(String),
}

impl LaunchError {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => LaunchError::NotFound,
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied,
            _ => LaunchError::Other(err.to_string()),
        }
    }
}

/// Notification from a running child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessMessage {
    /// A chunk of stdout or stderr, usually one line
    Output {
        kind: OperationKind,
        run_id: u64,
        chunk: String,
    },

    /// Normal exit with a status code. Always the last message of a run.
    Exited {
        kind: OperationKind,
        run_id: u64,
        code: i32,
    },

    /// Spawn failed or the child died without a status code.
    /// Always the last message of a run.
    Failed {
        kind: OperationKind,
        run_id: u64,
        error: LaunchError,
    },
}

impl ProcessMessage {
    /// Operation kind and run id the message belongs to
    pub fn origin(&self) -> (OperationKind, u64) {
        match self {
            ProcessMessage::Output { kind, run_id, .. }
            | ProcessMessage::Exited { kind, run_id, .. }
            | ProcessMessage::Failed { kind, run_id, .. } => (*kind, *run_id),
        }
    }
}

/// Handle to one supervised child process.
///
/// Dropping the handle aborts supervision and kills the child.
pub struct ProcessRunner {
    kill_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessRunner {
    /// Spawn `command` and start forwarding its output to `tx`.
    ///
    /// Launch errors are reported through `tx` as [`ProcessMessage::Failed`],
    /// never returned. After the child exits, the output readers get up to
    /// `drain` to flush before the terminal message is sent.
    pub fn start(
        kind: OperationKind,
        run_id: u64,
        command: &CommandSpec,
        drain: Duration,
        tx: mpsc::UnboundedSender<ProcessMessage>,
    ) -> Self {
        let (kill_tx, kill_rx) = oneshot::channel();
        let command = command.clone();

        let handle = tokio::spawn(supervise(kind, run_id, command, drain, kill_rx, tx));

        Self {
            kill_tx: Some(kill_tx),
            handle: Some(handle),
        }
    }

    /// Kill the child and wait up to `grace` for supervision to wind down
    pub async fn terminate(mut self, grace: Duration) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if timeout(grace, &mut handle).await.is_err() {
                warn!("Process did not stop within {:?}, aborting", grace);
                handle.abort();
            }
        }
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn supervise(
    kind: OperationKind,
    run_id: u64,
    command: CommandSpec,
    drain: Duration,
    mut kill_rx: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<ProcessMessage>,
) {
    debug!("Starting {} run {}: {}", kind, run_id, command);

    let spawned = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            debug!("Failed to spawn {}: {}", command.program, e);
            let _ = tx.send(ProcessMessage::Failed {
                kind,
                run_id,
                error: LaunchError::from_io(&e),
            });
            return;
        }
    };

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_output(stdout, kind, run_id, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_output(stderr, kind, run_id, tx.clone())));
    }

    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            debug!("Killing {} run {}", kind, run_id);
            let _ = child.start_kill();
            child.wait().await
        }
    };

    for mut reader in readers {
        if timeout(drain, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    let message = match status {
        Ok(status) => match status.code() {
            Some(code) => ProcessMessage::Exited {
                kind,
                run_id,
                code,
            },
            None => ProcessMessage::Failed {
                kind,
                run_id,
                error: LaunchError::Crashed,
            },
        },
        Err(e) => ProcessMessage::Failed {
            kind,
            run_id,
            error: LaunchError::from_io(&e),
        },
    };

    let _ = tx.send(message);
}

async fn forward_output<R>(
    stream: R,
    kind: OperationKind,
    run_id: u64,
    tx: mpsc::UnboundedSender<ProcessMessage>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf).into_owned();
                if tx
                    .send(ProcessMessage::Output {
                        kind,
                        run_id,
                        chunk,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                debug!("Output read error for {} run {}: {}", kind, run_id, e);
                break;
            }
        }
    }
}
