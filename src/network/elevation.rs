// file: src/network/elevation.rs
// version: 1.0.0
// guid: a93efc5f-550a-4bbf-9289-edb7a0c2ffc1

//! Privilege elevation and sudo password delivery
//!
//! The host user's password has to reach `sudo` without an interactive
//! prompt. How it gets there is behind [`CredentialDelivery`]; the stock
//! [`ScratchFileDelivery`] stages the command in a scratch file under the
//! install root and feeds the password to `sudo -S` from a history-less
//! environment variable. The staged file is transient but does persist the
//! command on the host, and the password briefly lives in the remote shell
//! environment.

/// Start of the environment assignment that carries the sudo password.
/// [`crate::network::executor::mask_secrets`] keys on this text.
pub const PASSWORD_PREAMBLE: &str = "export HISTFILE=/dev/null PASSWD=";

const SCRATCH_FILE: &str = "sudo-cmd";
const HEREDOC_TAG: &str = "BLX_PROVISIONER_CMD_EOF";

/// Remote commands needed to run one command with elevated privileges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedCommand {
    /// Optional preparation step, run as a plain command first
    pub staging: Option<String>,
    /// The command whose exit status and output are reported
    pub invocation: String,
}

/// Strategy for handing the elevation password to the remote helper
pub trait CredentialDelivery: Send + Sync {
    /// Build the remote command(s) that run `command` as root.
    /// `workdir` is the resolved install root on the host.
    fn elevate(&self, command: &str, workdir: &str) -> ElevatedCommand;
}

/// Stage the command in `<workdir>/sudo-cmd` and pipe the password to `sudo -S`
pub struct ScratchFileDelivery {
    password: String,
}

impl ScratchFileDelivery {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl CredentialDelivery for ScratchFileDelivery {
    fn elevate(&self, command: &str, workdir: &str) -> ElevatedCommand {
        let scratch = format!("{}/{}", workdir, SCRATCH_FILE);
        let staging = format!(
            "cat > {} <<'{tag}'\n{}\n{tag}",
            scratch,
            command,
            tag = HEREDOC_TAG
        );
        let invocation = format!(
            "{}{} ; echo \"$PASSWD\" | sudo -S -k -p \"\" bash {}",
            PASSWORD_PREAMBLE,
            shell_quote(&self.password),
            scratch
        );
        ElevatedCommand {
            staging: Some(staging),
            invocation,
        }
    }
}

/// Quote a value as a single POSIX shell word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
