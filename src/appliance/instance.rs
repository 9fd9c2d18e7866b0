// file: src/appliance/instance.rs
// version: 1.0.1
// guid: 8c1f4a57-93d2-4b0e-a6f1-2e7d9c3b5a08

//! One appliance deployment: validated desired state, identity and host paths

use super::distro::DistroKind;
use super::render::ConfigDocument;
use crate::config::{AuthMethod, DesiredState, HostKeyPolicy};
use crate::network::SshTarget;
use crate::{ProvisionError, Result};
use std::net::IpAddr;

/// Appliance administrator account
pub const ADMIN_USER: &str = "nsroot";

/// Management SSH port when the settings do not name one
pub const DEFAULT_MGMT_SSH_PORT: u16 = 9022;

/// Management SSH port when the appliance owns a dedicated address
const DEDICATED_MGMT_SSH_PORT: u16 = 22;

/// Working directory on the host, relative to the login user's home
pub const INSTALL_ROOT: &str = "~/.blx_provisioner";

/// Case-insensitive marker of a pooled-license directive
const POOLED_LICENSE_DIRECTIVE: &str = "licenseserver";

/// Host-side working paths, all under the resolved install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathSet {
    pub install_root: String,
    pub license_dir: String,
    pub package_dir: String,
    pub driver_dir: String,
    pub start_script: String,
    pub stop_script: String,
    pub start_log: String,
    pub stop_log: String,
}

impl FilePathSet {
    /// Derive every path from the absolute install root
    pub fn under(install_root: &str) -> Self {
        let root = install_root.trim_end_matches('/');
        Self {
            install_root: root.to_string(),
            license_dir: format!("{}/license", root),
            package_dir: format!("{}/blx_install", root),
            driver_dir: format!("{}/mellanox", root),
            start_script: format!("{}/blx_start.sh", root),
            stop_script: format!("{}/blx_stop.sh", root),
            start_log: format!("{}/blx_start.log", root),
            stop_log: format!("{}/blx_stop.log", root),
        }
    }
}

/// Parse `addr/prefix`, returning the address part when the prefix fits the family
fn cidr_address(raw: &str) -> Option<IpAddr> {
    let (addr, prefix) = raw.split_once('/')?;
    let addr: IpAddr = addr.trim().parse().ok()?;
    let prefix: u8 = prefix.trim().parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    (prefix <= max).then_some(addr)
}

/// Management identity: the dedicated address when declared, otherwise the host address.
///
/// A CIDR value yields the address as written, not the masked network:
/// `10.0.0.5/24` resolves to `10.0.0.5`.
pub fn resolve_identity(declared: Option<&str>, host_address: &str) -> Result<IpAddr> {
    match declared {
        Some(raw) => raw
            .trim()
            .parse::<IpAddr>()
            .ok()
            .or_else(|| cidr_address(raw))
            .ok_or_else(|| {
                ProvisionError::validation(format!("Invalid management IP address: {}", raw))
            }),
        None => host_address.trim().parse::<IpAddr>().map_err(|_| {
            ProvisionError::validation(format!("Invalid host IP address: {}", host_address))
        }),
    }
}

/// A validated appliance deployment and what has been learned about its host
#[derive(Debug, Clone)]
pub struct ApplianceInstance {
    desired: DesiredState,
    identity: IpAddr,
    /// The appliance owns a dedicated management address
    management_mode: bool,
    mgmt_port: u16,
    pub(crate) distro: Option<DistroKind>,
    pub(crate) paths: Option<FilePathSet>,
}

impl ApplianceInstance {
    /// Validate the desired state and fix the management identity
    pub fn new(desired: DesiredState) -> Result<Self> {
        desired.ensure_valid()?;

        let declared = desired.config.ipaddress.as_deref();
        let identity = resolve_identity(declared, &desired.host.ipaddress)?;
        let management_mode = declared.is_some();

        let mgmt_port = if management_mode {
            DEDICATED_MGMT_SSH_PORT
        } else {
            match desired.config.mgmt_ssh_port.as_deref() {
                Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                    ProvisionError::validation(format!("Invalid mgmt_ssh_port: {}", raw))
                })?,
                None => DEFAULT_MGMT_SSH_PORT,
            }
        };

        Ok(Self {
            desired,
            identity,
            management_mode,
            mgmt_port,
            distro: None,
            paths: None,
        })
    }

    /// Stable identifier, the management address
    pub fn id(&self) -> String {
        self.identity.to_string()
    }

    pub fn identity(&self) -> IpAddr {
        self.identity
    }

    pub fn management_mode(&self) -> bool {
        self.management_mode
    }

    pub fn management_port(&self) -> u16 {
        self.mgmt_port
    }

    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    /// Detected packaging family, once the host has been initialised
    pub fn distro(&self) -> Option<DistroKind> {
        self.distro
    }

    /// Resolved host paths, once the host has been initialised
    pub fn paths(&self) -> Option<&FilePathSet> {
        self.paths.as_ref()
    }

    /// Any CLI command configures a license server
    pub fn uses_pooled_licensing(&self) -> bool {
        self.desired
            .cli_commands
            .iter()
            .any(|cmd| cmd.to_lowercase().contains(POOLED_LICENSE_DIRECTIVE))
    }

    /// Session parameters for the host shell
    pub fn host_target(&self) -> SshTarget {
        let host = &self.desired.host;
        SshTarget {
            address: host.ipaddress.clone(),
            port: host.port,
            username: host.username.clone(),
            auth: host.auth_method(),
            host_key_policy: host.host_key_policy(),
        }
    }

    /// Session parameters for the appliance management endpoint
    pub fn appliance_target(&self) -> SshTarget {
        SshTarget {
            address: self.id(),
            port: self.mgmt_port,
            username: ADMIN_USER.to_string(),
            auth: AuthMethod::Password(self.desired.password.clone()),
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }

    /// The appliance configuration file this deployment should end up with
    pub fn render_config(&self) -> ConfigDocument {
        ConfigDocument::build(
            &self.desired.config,
            &self.desired.static_routes,
            &self.desired.cli_commands,
            &self.desired.password,
        )
    }
}
