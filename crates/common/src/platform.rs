// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 WireGuard Tunnel Manager Contributors

//! Platform command resolution
//!
//! Maps the three tunnel operations (connect, disconnect, stats) onto the
//! external tools available on the running OS. Resolution is pure given the
//! OS family and the results of a few filesystem probes; nothing is launched
//! from here.

use std::fmt;
use std::path::Path;

/// Known `wg-quick` install locations, probed in order
pub const WG_QUICK_CANDIDATES: [&str; 3] = [
    "/usr/bin/wg-quick",
    "/usr/local/bin/wg-quick",
    "/opt/homebrew/bin/wg-quick",
];

/// Known `wg` install locations, probed in order
pub const WG_CANDIDATES: [&str; 3] = ["/usr/bin/wg", "/usr/local/bin/wg", "/opt/homebrew/bin/wg"];

/// Known `wireguard.exe` install locations, probed in order
pub const WIREGUARD_EXE_CANDIDATES: [&str; 2] = [
    r"C:\Program Files\WireGuard\wireguard.exe",
    r"C:\Program Files (x86)\WireGuard\wireguard.exe",
];

/// Graphical privilege-escalation helper (polkit)
pub const GRAPHICAL_ELEVATION: &str = "/usr/bin/pkexec";

/// Terminal privilege-escalation fallback
pub const TERMINAL_ELEVATION: &str = "sudo";

/// An executable plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Operating system family, selects the command strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
}

impl OsFamily {
    /// The family this binary was built for; other Unixes behave like Linux
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::Linux
        }
    }
}

/// Strategy producing the commands for each tunnel operation.
///
/// Selected once when the connection manager is built.
pub trait CommandResolver: Send + Sync {
    /// Bring the tunnel up from its config file
    fn connect_command(&self, tunnel_id: &str, config_file: &Path) -> CommandSpec;

    /// Take the tunnel down
    fn disconnect_command(&self, tunnel_id: &str, config_file: &Path) -> CommandSpec;

    /// Query transfer counters for the tunnel
    fn stats_command(&self, tunnel_id: &str) -> CommandSpec;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    /// wireguard.exe tunnel service subcommands
    TunnelService { wireguard_exe: String },
    /// wg-quick through an elevation helper, wg for stats
    QuickTunnel {
        elevation: String,
        wg_quick: String,
        wg: String,
    },
}

/// Command table for the detected platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommands {
    os: OsFamily,
    strategy: Strategy,
}

impl PlatformCommands {
    /// Probe the real filesystem for the running OS
    pub fn detect() -> Self {
        Self::probe(OsFamily::current(), |path| path.exists())
    }

    /// Build the command table for `os`, using `exists` for filesystem probes
    pub fn probe<F>(os: OsFamily, exists: F) -> Self
    where
        F: Fn(&Path) -> bool,
    {
        let strategy = match os {
            OsFamily::Windows => Strategy::TunnelService {
                wireguard_exe: first_existing(&WIREGUARD_EXE_CANDIDATES, "wireguard.exe", &exists),
            },
            OsFamily::Linux => {
                let elevation = if exists(Path::new(GRAPHICAL_ELEVATION)) {
                    GRAPHICAL_ELEVATION
                } else {
                    TERMINAL_ELEVATION
                };
                Strategy::QuickTunnel {
                    elevation: elevation.to_string(),
                    wg_quick: first_existing(&WG_QUICK_CANDIDATES, "wg-quick", &exists),
                    wg: first_existing(&WG_CANDIDATES, "wg", &exists),
                }
            }
            // No graphical helper assumed on macOS
            OsFamily::MacOs => Strategy::QuickTunnel {
                elevation: TERMINAL_ELEVATION.to_string(),
                wg_quick: first_existing(&WG_QUICK_CANDIDATES, "wg-quick", &exists),
                wg: first_existing(&WG_CANDIDATES, "wg", &exists),
            },
        };

        Self { os, strategy }
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }
}

/// First candidate that exists, or the bare name for PATH lookup
fn first_existing<F>(candidates: &[&str], bare_name: &str, exists: &F) -> String
where
    F: Fn(&Path) -> bool,
{
    candidates
        .iter()
        .find(|candidate| exists(Path::new(candidate)))
        .copied()
        .unwrap_or(bare_name)
        .to_string()
}

impl CommandResolver for PlatformCommands {
    fn connect_command(&self, _tunnel_id: &str, config_file: &Path) -> CommandSpec {
        let config_file = config_file.display().to_string();
        match &self.strategy {
            Strategy::TunnelService { wireguard_exe } => {
                CommandSpec::new(wireguard_exe, ["/installtunnelservice".to_string(), config_file])
            }
            Strategy::QuickTunnel {
                elevation,
                wg_quick,
                ..
            } => CommandSpec::new(elevation, [wg_quick.clone(), "up".to_string(), config_file]),
        }
    }

    fn disconnect_command(&self, tunnel_id: &str, config_file: &Path) -> CommandSpec {
        match &self.strategy {
            Strategy::TunnelService { wireguard_exe } => {
                CommandSpec::new(wireguard_exe, ["/uninstalltunnelservice", tunnel_id])
            }
            Strategy::QuickTunnel {
                elevation,
                wg_quick,
                ..
            } => CommandSpec::new(
                elevation,
                [
                    wg_quick.clone(),
                    "down".to_string(),
                    config_file.display().to_string(),
                ],
            ),
        }
    }

    fn stats_command(&self, tunnel_id: &str) -> CommandSpec {
        match &self.strategy {
            Strategy::TunnelService { wireguard_exe } => {
                CommandSpec::new(wireguard_exe, ["/show", tunnel_id])
            }
            // Read-only status needs no elevation
            Strategy::QuickTunnel { wg, .. } => CommandSpec::new(wg, ["show", tunnel_id]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn probe_with(os: OsFamily, present: &[&str]) -> PlatformCommands {
        PlatformCommands::probe(os, |path| present.iter().any(|p| Path::new(p) == path))
    }

    #[test]
    fn test_linux_with_pkexec() {
        let commands = probe_with(
            OsFamily::Linux,
            &["/usr/bin/pkexec", "/usr/bin/wg-quick", "/usr/bin/wg"],
        );
        let config = PathBuf::from("/etc/wg-tunnel/dkt-us.conf");

        assert_eq!(
            commands.connect_command("dkt-us", &config),
            CommandSpec::new(
                "/usr/bin/pkexec",
                ["/usr/bin/wg-quick", "up", "/etc/wg-tunnel/dkt-us.conf"]
            )
        );
        assert_eq!(
            commands.disconnect_command("dkt-us", &config),
            CommandSpec::new(
                "/usr/bin/pkexec",
                ["/usr/bin/wg-quick", "down", "/etc/wg-tunnel/dkt-us.conf"]
            )
        );
        assert_eq!(
            commands.stats_command("dkt-us"),
            CommandSpec::new("/usr/bin/wg", ["show", "dkt-us"])
        );
    }

    #[test]
    fn test_linux_without_pkexec_falls_back_to_sudo() {
        let commands = probe_with(OsFamily::Linux, &["/usr/local/bin/wg-quick"]);
        let config = PathBuf::from("/tmp/dkt-uk.conf");

        let connect = commands.connect_command("dkt-uk", &config);
        assert_eq!(connect.program, "sudo");
        assert_eq!(connect.args, ["/usr/local/bin/wg-quick", "up", "/tmp/dkt-uk.conf"]);

        // wg not installed anywhere known: rely on PATH
        assert_eq!(
            commands.stats_command("dkt-uk"),
            CommandSpec::new("wg", ["show", "dkt-uk"])
        );
    }

    #[test]
    fn test_macos_always_uses_sudo() {
        let commands = probe_with(
            OsFamily::MacOs,
            &[
                "/usr/bin/pkexec",
                "/opt/homebrew/bin/wg-quick",
                "/opt/homebrew/bin/wg",
            ],
        );
        let config = PathBuf::from("/Users/me/dkt-jp.conf");

        assert_eq!(
            commands.connect_command("dkt-jp", &config),
            CommandSpec::new(
                "sudo",
                ["/opt/homebrew/bin/wg-quick", "up", "/Users/me/dkt-jp.conf"]
            )
        );
        assert_eq!(
            commands.disconnect_command("dkt-jp", &config).args[1],
            "down"
        );
        assert_eq!(
            commands.stats_command("dkt-jp").program,
            "/opt/homebrew/bin/wg"
        );
    }

    #[test]
    fn test_windows_tunnel_service() {
        let commands = probe_with(
            OsFamily::Windows,
            &[r"C:\Program Files (x86)\WireGuard\wireguard.exe"],
        );
        let exe = r"C:\Program Files (x86)\WireGuard\wireguard.exe";
        let config = PathBuf::from(r"C:\configs\dkt-de.conf");

        let connect = commands.connect_command("dkt-de", &config);
        assert_eq!(connect.program, exe);
        assert_eq!(connect.args[0], "/installtunnelservice");
        assert_eq!(connect.args.len(), 2);

        // Service is removed by tunnel name, not by config path
        assert_eq!(
            commands.disconnect_command("dkt-de", &config),
            CommandSpec::new(exe, ["/uninstalltunnelservice", "dkt-de"])
        );
        assert_eq!(
            commands.stats_command("dkt-de"),
            CommandSpec::new(exe, ["/show", "dkt-de"])
        );
    }

    #[test]
    fn test_windows_prefers_first_install_location() {
        let commands = probe_with(OsFamily::Windows, &WIREGUARD_EXE_CANDIDATES);
        assert_eq!(
            commands.stats_command("t").program,
            WIREGUARD_EXE_CANDIDATES[0]
        );

        let bare = probe_with(OsFamily::Windows, &[]);
        assert_eq!(bare.stats_command("t").program, "wireguard.exe");
        assert_eq!(bare.os(), OsFamily::Windows);
    }

    #[test]
    fn test_command_display() {
        let spec = CommandSpec::new("sudo", ["wg-quick", "up", "/tmp/a.conf"]);
        assert_eq!(spec.to_string(), "sudo wg-quick up /tmp/a.conf");
    }
}
