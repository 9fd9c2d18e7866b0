// file: src/network/executor.rs
// version: 2.1.0
// guid: exec0001-2345-6789-abcd-ef0123456789

//! Remote command execution in plain, elevated and appliance-shell modes

use super::elevation::{CredentialDelivery, PASSWORD_PREAMBLE};
use crate::{ProvisionError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// PATH normalisation prepended to every plain host command
pub const PATH_PREFIX: &str = "export PATH=$PATH:/usr/local/sbin:/usr/sbin:/usr/local/bin:/usr/bin";

/// Prefix that drops an appliance management command into its system shell
pub const APPLIANCE_SHELL_PREFIX: &str = "shell";

const MASK: &str = "<PASSWD>";

/// Exit status and combined stdout/stderr of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// A live remote shell session
///
/// `exec` only fails on transport problems; a non-zero exit is reported in
/// the returned [`CommandOutput`].
#[async_trait::async_trait]
pub trait RemoteShell: Send {
    /// Run one command and capture its combined output
    async fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    /// Copy a local file to an absolute remote path
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Close the session
    fn disconnect(&mut self);
}

/// Replace the value of every sudo password assignment with a placeholder
pub fn mask_secrets(command: &str) -> String {
    let mut masked = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(pos) = rest.find(PASSWORD_PREAMBLE) {
        let value_start = pos + PASSWORD_PREAMBLE.len();
        masked.push_str(&rest[..value_start]);
        masked.push_str(MASK);
        rest = &rest[value_start + shell_word_len(&rest[value_start..])..];
    }
    masked.push_str(rest);
    masked
}

/// Byte length of the shell word at the start of `text`, honouring quotes
/// and backslash escapes
fn shell_word_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'\'' {
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'\\' => i += 2,
            b' ' | b'\t' | b'\n' | b';' | b'&' | b'|' => break,
            _ => i += 1,
        }
    }
    i.min(bytes.len())
}

async fn exec_logged<S>(shell: &mut S, wire: &str, shown: &str) -> Result<String>
where
    S: RemoteShell + ?Sized,
{
    debug!("Executing command - {}", shown);
    let result = shell.exec(wire).await?;
    debug!("Printing output -\n{}", result.output);

    if !result.success() {
        warn!(
            "Command exited with status {} - {}",
            result.exit_status, shown
        );
        return Err(ProvisionError::remote_command(shown, result.output));
    }
    Ok(result.output)
}

/// Run a host command with the normalised PATH
pub async fn run_plain<S>(shell: &mut S, command: &str) -> Result<String>
where
    S: RemoteShell + ?Sized,
{
    let wire = format!("{} ; {}", PATH_PREFIX, command);
    exec_logged(shell, &wire, &mask_secrets(command)).await
}

/// Run a command inside the appliance's system shell over the management session
pub async fn run_appliance_shell<S>(shell: &mut S, command: &str) -> Result<String>
where
    S: RemoteShell + ?Sized,
{
    let wire = format!("{} {}", APPLIANCE_SHELL_PREFIX, command);
    exec_logged(shell, &wire, &mask_secrets(&wire)).await
}

/// Host shell bound to an elevation strategy and the resolved install root
pub struct HostRunner<'a, S: ?Sized> {
    shell: &'a mut S,
    delivery: &'a dyn CredentialDelivery,
    workdir: Option<&'a str>,
}

impl<'a, S> HostRunner<'a, S>
where
    S: RemoteShell + ?Sized,
{
    pub fn new(
        shell: &'a mut S,
        delivery: &'a dyn CredentialDelivery,
        workdir: Option<&'a str>,
    ) -> Self {
        Self {
            shell,
            delivery,
            workdir,
        }
    }

    /// Plain command; non-zero exit is an error
    pub async fn run(&mut self, command: &str) -> Result<String> {
        run_plain(&mut *self.shell, command).await
    }

    /// Command run as root through the credential delivery strategy
    pub async fn sudo(&mut self, command: &str) -> Result<String> {
        let workdir = self.workdir.ok_or_else(|| {
            ProvisionError::config("Host not initialised: elevation needs the install root")
        })?;
        let elevated = self.delivery.elevate(command, workdir);
        let shown = mask_secrets(command);

        if let Some(staging) = &elevated.staging {
            run_plain(&mut *self.shell, staging)
                .await
                .map_err(|e| match e {
                    ProvisionError::RemoteCommand { output, .. } => {
                        ProvisionError::remote_command(shown.clone(), output)
                    }
                    other => other,
                })?;
        }

        debug!("Executing elevated command - {}", shown);
        match run_plain(&mut *self.shell, &elevated.invocation).await {
            Err(ProvisionError::RemoteCommand { output, .. }) => {
                Err(ProvisionError::remote_command(shown, output))
            }
            other => other,
        }
    }

    /// Elevated command whose failure is logged and otherwise ignored
    pub async fn sudo_best_effort(&mut self, command: &str) -> Option<String> {
        match self.sudo(command).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("Ignoring failure of best-effort command: {}", e);
                None
            }
        }
    }

    /// Boolean check: `Ok(true)` on exit 0, `Ok(false)` otherwise, `Err` on transport issues
    pub async fn check(&mut self, command: &str) -> Result<bool> {
        let wire = format!("{} ; {}", PATH_PREFIX, command);
        Ok(self.shell.exec(&wire).await?.success())
    }

    /// Copy a local file to the host
    pub async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        debug!(
            "Copying file from {} to {}",
            local_path.display(),
            remote_path
        );
        self.shell
            .upload(local_path, remote_path)
            .await
            .map_err(|e| {
                ProvisionError::transfer(format!(
                    "Error copying file from {} to {}: {}",
                    local_path.display(),
                    remote_path,
                    e
                ))
            })
    }
}
