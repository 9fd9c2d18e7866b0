// file: src/appliance/offload.rs
// version: 1.0.0
// guid: 4f8c2e19-6b07-4da3-91e5-a03d7b5c8e26

//! Optional hardware-offload driver and management tools

use super::distro::DistroKind;
use crate::config::OffloadArtifacts;
use crate::network::transfer::{artifact_name, fetch, gunzip};
use crate::network::{HostRunner, RemoteShell};
use crate::{ProvisionError, Result};
use tracing::{error, info, warn};

pub const OFED_MOUNT_POINT: &str = "/mnt/mlnxofed";

const OFED_INSTALLER_FLAGS: &str =
    "--add-kernel-support --skip-repo --skip-distro-check --skip-unsupported-devices-check";

/// Installer output when it does not recognise the host OS
pub const UNSUPPORTED_OS_MARKER: &str = "Current operation system is not supported";

const DRIVER_RELOAD: &str = "/etc/init.d/openibd restart";

/// How the driver installer finally succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerOutcome {
    Native,
    /// Retried with `--distro <id><version>`
    DistroOverride(String),
}

fn installer_command() -> String {
    format!("{}/mlnxofedinstall {}", OFED_MOUNT_POINT, OFED_INSTALLER_FLAGS)
}

/// Installs the offload driver from its ISO and the optional tools tarball
pub struct OffloadInstaller<'a, S: ?Sized> {
    runner: HostRunner<'a, S>,
    distro: DistroKind,
    driver_dir: &'a str,
}

impl<'a, S> OffloadInstaller<'a, S>
where
    S: RemoteShell + ?Sized,
{
    pub fn new(runner: HostRunner<'a, S>, distro: DistroKind, driver_dir: &'a str) -> Self {
        Self {
            runner,
            distro,
            driver_dir,
        }
    }

    pub async fn install(&mut self, artifacts: &OffloadArtifacts) -> Result<()> {
        self.runner
            .sudo_best_effort(&format!("rm -rf {}", self.driver_dir))
            .await;

        if let Some(ofed) = &artifacts.ofed {
            let outcome = self.install_driver(ofed).await?;
            info!("Offload driver installed ({:?})", outcome);
        }

        self.runner.sudo(DRIVER_RELOAD).await?;

        if let Some(tools) = &artifacts.tools {
            self.install_tools(tools).await?;
        }
        Ok(())
    }

    async fn install_driver(&mut self, source: &str) -> Result<InstallerOutcome> {
        let image = fetch(&mut self.runner, source, self.driver_dir).await?;
        let image = gunzip(&mut self.runner, &image).await?;

        self.runner
            .sudo_best_effort(&format!("umount -f {}", OFED_MOUNT_POINT))
            .await;
        self.runner
            .sudo(&format!(
                "mkdir -p {mnt} ; mount -o ro,loop {} {mnt}",
                image,
                mnt = OFED_MOUNT_POINT
            ))
            .await?;

        self.runner
            .sudo_best_effort(self.distro.kernel_headers_command())
            .await;

        self.run_installer().await
    }

    async fn run_installer(&mut self) -> Result<InstallerOutcome> {
        let command = installer_command();
        match self.runner.sudo(&command).await {
            Ok(_) => Ok(InstallerOutcome::Native),
            Err(ProvisionError::RemoteCommand { command: shown, output })
                if output.contains(UNSUPPORTED_OS_MARKER) =>
            {
                warn!("Installer rejected the host OS, retrying with an explicit distro");
                let Some(distro) = self.os_release_tag().await else {
                    error!("Unable to detect OS distro for the driver installer");
                    return Err(ProvisionError::RemoteCommand {
                        command: shown,
                        output,
                    });
                };
                self.runner
                    .sudo(&format!("{} --distro {}", command, distro))
                    .await?;
                Ok(InstallerOutcome::DistroOverride(distro))
            }
            Err(e) => Err(e),
        }
    }

    /// `<ID><VERSION_ID>` from `/etc/os-release`, e.g. `rhel8.6`
    async fn os_release_tag(&mut self) -> Option<String> {
        let id = self
            .runner
            .sudo(". /etc/os-release && echo $ID")
            .await
            .ok()?;
        let version = self
            .runner
            .sudo(". /etc/os-release && echo $VERSION_ID")
            .await
            .ok()?;
        let (id, version) = (id.trim(), version.trim());
        if id.is_empty() || version.is_empty() {
            return None;
        }
        Some(format!("{}{}", id, version))
    }

    async fn install_tools(&mut self, source: &str) -> Result<()> {
        let tools_dir = format!("{}/tools", self.driver_dir);
        fetch(&mut self.runner, source, &tools_dir).await?;

        self.runner
            .sudo(&format!(
                "cd {} ; tar xzf {} ; cd \"$(find . -mindepth 1 -maxdepth 1 -type d | head -n 1)\" ; ./install.sh",
                tools_dir,
                artifact_name(source)
            ))
            .await?;

        self.runner.sudo("mst start").await?;
        self.runner.sudo("mst status -v").await?;
        info!("Offload management tools running");
        Ok(())
    }
}
