// file: src/error.rs
// version: 3.0.0
// guid: 57b83a63-07b6-4534-aa6c-51e8797254e0

use thiserror::Error;

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Error types for appliance provisioning
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unable to reach {address}:{port} after {attempts} attempts")]
    Unreachable {
        address: String,
        port: u16,
        attempts: u32,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// `command` is always the masked command text.
    #[error("Error running command - {command}\n{output}")]
    RemoteCommand { command: String, output: String },

    #[error("Unknown OS distribution: neither yum nor apt-get found on host")]
    UnknownDistro,

    #[error("Install error: {0}")]
    Install(String),

    #[error("Service not registered: {0}")]
    ServiceNotRegistered(String),

    #[error("Appliance not reachable on {address}:{port} after {attempts} attempts")]
    ReadinessTimeout {
        address: String,
        port: u16,
        attempts: u32,
    },

    #[error("{remaining} appliance processes still running after {attempts} checks")]
    ProcessLingering { remaining: usize, attempts: u32 },

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProvisionError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new remote command error from an already masked command
    pub fn remote_command(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::RemoteCommand {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Create a new install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create a new transfer error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a new SSH transport error
    pub fn ssh(msg: impl Into<String>) -> Self {
        Self::Ssh(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Captured remote output, if this error came from a remote command
    pub fn remote_output(&self) -> Option<&str> {
        match self {
            Self::RemoteCommand { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for ProvisionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_command_display_carries_output() {
        let err = ProvisionError::remote_command("systemctl stop blx", "unit not found");
        let text = err.to_string();
        assert!(text.contains("systemctl stop blx"));
        assert!(text.contains("unit not found"));
        assert_eq!(err.remote_output(), Some("unit not found"));
    }

    #[test]
    fn test_remote_output_absent_for_other_errors() {
        assert!(ProvisionError::install("boom").remote_output().is_none());
    }
}
