// file: src/network/ssh.rs
// version: 2.1.0
// guid: t0u1v2w3-x4y5-6789-0123-456789tuvwxy

//! SSH client for the host shell and the appliance management endpoint.
//!
//! libssh2 calls block, so every session operation runs on tokio's blocking
//! pool. The calling task stays pollable while a long remote command runs.

use super::executor::{CommandOutput, RemoteShell};
use crate::config::{AuthMethod, HostKeyPolicy};
use crate::{ProvisionError, Result};
use ssh2::{CheckResult, ExtendedData, KnownHostFileKind, KnownHosts, Session};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bound on dialing, handshake and authentication. Established sessions have none.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Everything needed to open one SSH session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub host_key_policy: HostKeyPolicy,
}

/// SSH client for remote operations
pub struct SshClient {
    session: Option<Session>,
    host: String,
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProvisionError::ssh(format!("SSH worker task failed: {}", e)))?
}

impl SshClient {
    /// Create a new, unconnected SSH client
    pub fn new() -> Self {
        Self {
            session: None,
            host: String::new(),
        }
    }

    /// Handshake, verify the host key per policy and authenticate
    pub async fn connect(&mut self, target: &SshTarget) -> Result<()> {
        info!(
            "Connecting to {}:{} as {} ({} auth)",
            target.address,
            target.port,
            target.username,
            target.auth.label()
        );

        let owned = target.clone();
        let session = blocking(move || open_session(&owned)).await?;

        self.session = Some(session);
        self.host = format!("{}:{}", target.address, target.port);

        info!("SSH connection established to {}", self.host);
        Ok(())
    }

    fn session(&self) -> Result<Session> {
        self.session
            .clone()
            .ok_or_else(|| ProvisionError::ssh("No active SSH session"))
    }
}

fn dial(target: &SshTarget) -> Result<TcpStream> {
    let addrs = (target.address.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| {
            ProvisionError::ssh(format!(
                "Failed to resolve {}:{}: {}",
                target.address, target.port, e
            ))
        })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => last_error = Some(e),
        }
    }
    Err(ProvisionError::ssh(format!(
        "Failed to connect to {}:{}: {}",
        target.address,
        target.port,
        last_error.map_or_else(|| "no address".to_string(), |e| e.to_string())
    )))
}

fn open_session(target: &SshTarget) -> Result<Session> {
    let tcp = dial(target)?;

    let mut session = Session::new()
        .map_err(|e| ProvisionError::ssh(format!("Failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(CONNECT_TIMEOUT.as_millis() as u32);
    session
        .handshake()
        .map_err(|e| ProvisionError::ssh(format!("SSH handshake failed: {}", e)))?;

    if target.host_key_policy == HostKeyPolicy::KnownHosts {
        verify_host_key(&session, target)?;
    }

    let auth_result = match &target.auth {
        AuthMethod::Keyfile(path) => session.userauth_pubkey_file(&target.username, None, path, None),
        AuthMethod::Password(password) => session.userauth_password(&target.username, password),
        AuthMethod::Agent => session.userauth_agent(&target.username),
    };
    auth_result.map_err(|e| {
        ProvisionError::auth(format!(
            "{}@{}:{} rejected {} authentication: {}",
            target.username,
            target.address,
            target.port,
            target.auth.label(),
            e
        ))
    })?;

    if !session.authenticated() {
        return Err(ProvisionError::auth(format!(
            "{}@{}:{} not authenticated",
            target.username, target.address, target.port
        )));
    }

    // remote installs and downloads may stay silent for a long time
    session.set_timeout(0);
    Ok(session)
}

fn known_hosts_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProvisionError::config("Unable to determine HOME directory"))?;
    Ok(home.join(".ssh").join("known_hosts"))
}

fn load_known_hosts(session: &Session, path: &Path) -> Result<KnownHosts> {
    debug!("Host key file = {}", path.display());
    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| ProvisionError::ssh(format!("Failed to open known hosts: {}", e)))?;
    known_hosts
        .read_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|e| ProvisionError::auth(format!("Unable to read {}: {}", path.display(), e)))?;
    Ok(known_hosts)
}

fn check_host_key(known_hosts: &KnownHosts, target: &SshTarget, key: &[u8]) -> Result<()> {
    match known_hosts.check_port(&target.address, target.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(ProvisionError::auth(format!(
            "Host key for {}:{} not found in known hosts",
            target.address, target.port
        ))),
        CheckResult::Mismatch => Err(ProvisionError::auth(format!(
            "Host key for {}:{} does not match known hosts",
            target.address, target.port
        ))),
        CheckResult::Failure => Err(ProvisionError::auth(format!(
            "Host key check failed for {}:{}",
            target.address, target.port
        ))),
    }
}

fn verify_host_key(session: &Session, target: &SshTarget) -> Result<()> {
    let known_hosts = load_known_hosts(session, &known_hosts_path()?)?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| ProvisionError::auth("Server presented no host key"))?;
    check_host_key(&known_hosts, target, key)
}

fn exec_blocking(session: &Session, command: &str) -> Result<CommandOutput> {
    let mut channel = session
        .channel_session()
        .map_err(|e| ProvisionError::ssh(format!("Failed to create SSH channel: {}", e)))?;

    channel
        .handle_extended_data(ExtendedData::Merge)
        .map_err(|e| ProvisionError::ssh(format!("Failed to merge stderr: {}", e)))?;

    channel
        .exec(command)
        .map_err(|e| ProvisionError::ssh(format!("Failed to execute command: {}", e)))?;

    let mut raw = Vec::new();
    channel
        .read_to_end(&mut raw)
        .map_err(|e| ProvisionError::ssh(format!("Failed to read output: {}", e)))?;

    channel
        .wait_close()
        .map_err(|e| ProvisionError::ssh(format!("Failed to close SSH channel: {}", e)))?;

    let exit_status = channel
        .exit_status()
        .map_err(|e| ProvisionError::ssh(format!("Failed to get exit status: {}", e)))?;

    Ok(CommandOutput {
        exit_status,
        output: String::from_utf8_lossy(&raw).into_owned(),
    })
}

fn upload_blocking(session: &Session, local_path: &Path, remote_path: &str) -> Result<()> {
    let metadata = std::fs::metadata(local_path)?;
    let mode = file_mode(&metadata);
    let file_content = std::fs::read(local_path)?;

    let mut remote_file = session
        .scp_send(Path::new(remote_path), mode, metadata.len(), None)
        .map_err(|e| ProvisionError::ssh(format!("Failed to create SCP channel: {}", e)))?;

    remote_file
        .write_all(&file_content)
        .map_err(|e| ProvisionError::ssh(format!("Failed to write file data: {}", e)))?;
    remote_file
        .send_eof()
        .map_err(|e| ProvisionError::ssh(format!("Failed to send EOF: {}", e)))?;
    remote_file
        .wait_eof()
        .map_err(|e| ProvisionError::ssh(format!("Failed to wait for EOF: {}", e)))?;
    remote_file
        .close()
        .map_err(|e| ProvisionError::ssh(format!("Failed to close remote file: {}", e)))?;
    remote_file
        .wait_close()
        .map_err(|e| ProvisionError::ssh(format!("Failed to wait for close: {}", e)))?;
    Ok(())
}

#[async_trait::async_trait]
impl RemoteShell for SshClient {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let session = self.session()?;
        let command = command.to_string();
        blocking(move || exec_blocking(&session, &command)).await
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        info!(
            "Uploading {} to {}:{}",
            local_path.display(),
            self.host,
            remote_path
        );

        let session = self.session()?;
        let local_path = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        blocking(move || upload_blocking(&session, &local_path, &remote_path)).await?;

        info!("File upload completed");
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "", None);
            info!("SSH session to {} disconnected", self.host);
        }
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    (metadata.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> i32 {
    0o600
}

impl Drop for SshClient {
    fn drop(&mut self) {
        RemoteShell::disconnect(self);
    }
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new()
    }
}
