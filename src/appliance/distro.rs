// file: src/appliance/distro.rs
// version: 1.0.0
// guid: 5e2b7d90-1c4a-4f63-8b5e-d07a9f2c6e14

//! Host packaging family and the commands that differ between families

use super::attempts::Alternative;
use crate::network::{HostRunner, RemoteShell};
use crate::{ProvisionError, Result};
use tracing::info;

/// systemd unit registered by the appliance package
pub const SERVICE_UNIT: &str = "blx.service";

/// Changes into the first directory unpacked from the package tarball
const ENTER_EXTRACTED: &str = r#"cd "$(find . -mindepth 1 -maxdepth 1 -type d | head -n 1)""#;

/// Packaging family, fixed for a run once detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroKind {
    Rpm,
    Deb,
}

impl DistroKind {
    /// Package-manager probes in the order they are tried
    pub const PROBE_ORDER: [(&'static str, DistroKind); 2] =
        [("yum", DistroKind::Rpm), ("apt-get", DistroKind::Deb)];

    pub fn package_manager(&self) -> &'static str {
        match self {
            DistroKind::Rpm => "yum",
            DistroKind::Deb => "apt",
        }
    }

    fn unpack(package_dir: &str, tarball: &str) -> String {
        format!("cd {} ; tar xzf {} ; {}", package_dir, tarball, ENTER_EXTRACTED)
    }

    /// Fresh install from the unpacked tarball
    pub fn install_command(&self, package_dir: &str, tarball: &str) -> String {
        match self {
            DistroKind::Rpm => format!("{} ; yum install -y *.rpm", Self::unpack(package_dir, tarball)),
            DistroKind::Deb => format!(
                "{} ; apt install -y -o Dpkg::Options::=\"--force-confold\" --allow-downgrades ./*.deb",
                Self::unpack(package_dir, tarball)
            ),
        }
    }

    /// Commands tried in order when the fresh install fails
    pub fn fallback_commands(&self, package_dir: &str) -> Vec<Alternative> {
        let enter = format!("cd {} ; {}", package_dir, ENTER_EXTRACTED);
        match self {
            DistroKind::Rpm => vec![
                Alternative::new("downgrade", format!("{} ; yum downgrade -y *.rpm", enter)),
                Alternative::new("reinstall", format!("{} ; yum reinstall -y *.rpm", enter)),
            ],
            // apt's --allow-downgrades already covers both cases
            DistroKind::Deb => Vec::new(),
        }
    }

    /// Full ordered list: install first, then the fallbacks
    pub fn install_alternatives(&self, package_dir: &str, tarball: &str) -> Vec<Alternative> {
        let mut alternatives = vec![Alternative::new(
            "install",
            self.install_command(package_dir, tarball),
        )];
        alternatives.extend(self.fallback_commands(package_dir));
        alternatives
    }

    /// Exits 0 when the service unit is registered with systemd
    pub fn registration_check(&self) -> String {
        format!("systemctl list-unit-files | grep -q {}", SERVICE_UNIT)
    }

    /// Kernel headers for the running kernel, needed to rebuild the offload driver
    pub fn kernel_headers_command(&self) -> &'static str {
        match self {
            DistroKind::Rpm => "yum install -y \"kernel-devel-uname-r == $(uname -r)\"",
            DistroKind::Deb => "apt install -y linux-headers-$(uname -r)",
        }
    }

    /// Remove the appliance package
    pub fn removal_command(&self) -> &'static str {
        match self {
            DistroKind::Rpm => "yum remove -y blx",
            DistroKind::Deb => "apt-get purge -y blx",
        }
    }

    /// Directives that open the UDP syslog listener, in this family's rsyslog dialect
    pub fn syslog_udp_directives(&self) -> Vec<String> {
        match self {
            DistroKind::Rpm => vec!["$ModLoad imudp".to_string(), "$UDPServerRun 514".to_string()],
            DistroKind::Deb => vec![
                "module(load=\"imudp\")".to_string(),
                "input(type=\"imudp\" port=\"514\")".to_string(),
            ],
        }
    }
}

impl std::fmt::Display for DistroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistroKind::Rpm => write!(f, "RPM"),
            DistroKind::Deb => write!(f, "DEB"),
        }
    }
}

/// Probe the host for a known package manager
pub async fn detect<S>(runner: &mut HostRunner<'_, S>) -> Result<DistroKind>
where
    S: RemoteShell + ?Sized,
{
    for (manager, kind) in DistroKind::PROBE_ORDER {
        if runner.check(&format!("which {}", manager)).await? {
            info!("Host packaging family is {} ({} found)", kind, manager);
            return Ok(kind);
        }
    }
    Err(ProvisionError::UnknownDistro)
}
