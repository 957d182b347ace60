// Error types for WireGuard Tunnel Manager

use thiserror::Error;

use crate::process::LaunchError;

/// Errors surfaced by the connection manager and its collaborators.
///
/// The `Display` text of the first five variants is the message published
/// alongside [`ConnectionState::Error`](crate::ConnectionState::Error).
#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Config file not found for {server}.\n\
         Copy configs/{tunnel_id}.conf.template to configs/{tunnel_id}.conf \
         and fill in your credentials."
    )]
    ConfigNotFound { server: String, tunnel_id: String },

    #[error(
        "Failed to launch {program}: {reason}. \
         Please install WireGuard and ensure it is in your PATH."
    )]
    LaunchFailure { program: String, reason: LaunchError },

    #[error("WireGuard process crashed unexpectedly.")]
    ProcessCrash,

    #[error("Failed to connect (exit code {code}).\n{output}")]
    NonZeroExit { code: i32, output: String },

    #[error("Disconnect may have failed (exit code {code}). Check tunnel status manually.")]
    DisconnectAmbiguous { code: i32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Classify a launch failure of `program`.
    ///
    /// A crash is reported on its own; everything else means the tool or the
    /// elevation helper could not be run.
    pub fn launch(program: impl Into<String>, reason: LaunchError) -> Self {
        match reason {
            LaunchError::Crashed => Error::ProcessCrash,
            reason => Error::LaunchFailure {
                program: program.into(),
                reason,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_message_names_template() {
        let err = Error::ConfigNotFound {
            server: "Germany".to_string(),
            tunnel_id: "dkt-de".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Config file not found for Germany."));
        assert!(msg.contains("configs/dkt-de.conf.template"));
    }

    #[test]
    fn test_launch_classification() {
        assert!(matches!(
            Error::launch("wg-quick", LaunchError::Crashed),
            Error::ProcessCrash
        ));

        let err = Error::launch("/usr/bin/pkexec", LaunchError::NotFound);
        assert!(matches!(err, Error::LaunchFailure { .. }));
        assert!(err.to_string().contains("/usr/bin/pkexec"));
        assert!(err.to_string().contains("ensure it is in your PATH"));
    }

    #[test]
    fn test_non_zero_exit_includes_output() {
        let err = Error::NonZeroExit {
            code: 1,
            output: "wg-quick: `wg0' already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect (exit code 1).\nwg-quick: `wg0' already exists"
        );
    }
}
