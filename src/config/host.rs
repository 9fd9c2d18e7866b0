// file: src/config/host.rs
// version: 1.0.0
// guid: 2dd55f9f-55eb-431c-9ccd-6ac44e225ee1

//! Host shell credential

use super::de;
use serde::Deserialize;
use std::path::PathBuf;
use validator::Validate;

/// Default SSH port for the host shell
pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// How the host's SSH key is checked during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept whatever key the host presents
    #[default]
    AcceptAny,
    /// Require a match in the user's `~/.ssh/known_hosts`
    KnownHosts,
}

impl HostKeyPolicy {
    /// Map the boolean-like `ssh_hostkey_check` flag onto a policy
    pub fn from_flag(check: bool) -> Self {
        if check {
            HostKeyPolicy::KnownHosts
        } else {
            HostKeyPolicy::AcceptAny
        }
    }
}

/// Authentication method derived from which credential field is populated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Keyfile(PathBuf),
    Password(String),
    /// Neither field set: defer to a running ssh-agent
    Agent,
}

impl AuthMethod {
    /// Short label for logs, never containing the secret
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::Keyfile(_) => "keyfile",
            AuthMethod::Password(_) => "password",
            AuthMethod::Agent => "agent",
        }
    }
}

/// Access to the host shell
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HostCredential {
    /// Host address
    #[validate(length(min = 1, message = "IP address not provided for appliance host"))]
    pub ipaddress: String,
    /// Login user
    #[validate(length(min = 1, message = "Username not provided for appliance host"))]
    pub username: String,
    /// Login (and sudo) password, mutually exclusive with `keyfile`
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub password: Option<String>,
    /// Private key path, mutually exclusive with `password`
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub keyfile: Option<String>,
    #[serde(default = "default_ssh_port", deserialize_with = "de::port")]
    pub port: u16,
    #[serde(default, deserialize_with = "de::flag")]
    pub ssh_hostkey_check: bool,
}

impl HostCredential {
    /// Reject contradictory credentials
    pub fn ensure_valid(&self) -> crate::Result<()> {
        self.validate()?;
        if self.password.is_some() && self.keyfile.is_some() {
            return Err(crate::ProvisionError::validation(
                "Both keyfile and password provided for appliance host",
            ));
        }
        Ok(())
    }

    /// Auth method; the keyfile wins if both were let through
    pub fn auth_method(&self) -> AuthMethod {
        if let Some(keyfile) = &self.keyfile {
            let expanded = shellexpand::tilde(keyfile).into_owned();
            return AuthMethod::Keyfile(PathBuf::from(expanded));
        }
        match &self.password {
            Some(password) => AuthMethod::Password(password.clone()),
            None => AuthMethod::Agent,
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        HostKeyPolicy::from_flag(self.ssh_hostkey_check)
    }

    /// Password handed to the elevation helper; empty for key-based logins
    pub fn elevation_password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}
