// file: src/appliance/package.rs
// version: 1.0.0
// guid: c2f05a8e-3d71-4b96-8e2a-6b1d9f47c035

//! Appliance package installation and removal on the host

use super::attempts::{try_in_order, AttemptLog};
use super::distro::{DistroKind, SERVICE_UNIT};
use crate::network::transfer::{artifact_name, fetch};
use crate::network::{HostRunner, RemoteShell};
use crate::{ProvisionError, Result};
use tracing::{error, info, warn};

/// Installs the appliance package with the host's package manager
pub struct PackageInstaller<'a, S: ?Sized> {
    runner: HostRunner<'a, S>,
    distro: DistroKind,
    package_dir: &'a str,
}

impl<'a, S> PackageInstaller<'a, S>
where
    S: RemoteShell + ?Sized,
{
    pub fn new(runner: HostRunner<'a, S>, distro: DistroKind, package_dir: &'a str) -> Self {
        Self {
            runner,
            distro,
            package_dir,
        }
    }

    /// Fetch, install through the fallback chain and confirm the service unit
    pub async fn install(&mut self, source: &str) -> Result<AttemptLog> {
        self.runner
            .sudo_best_effort(&format!("rm -rf {}/*", self.package_dir))
            .await;

        fetch(&mut self.runner, source, self.package_dir)
            .await
            .map_err(|e| {
                ProvisionError::transfer(format!(
                    "Unable to get install package from {}: {}",
                    source, e
                ))
            })?;
        info!("Copied appliance package to {}", self.package_dir);

        if self.distro == DistroKind::Rpm {
            if let Err(e) = self.install_epel().await {
                warn!("Unable to install dependent package epel-release: {}", e);
            }
        }

        let tarball = artifact_name(source);
        let alternatives = self.distro.install_alternatives(self.package_dir, &tarball);
        let log = try_in_order(&mut self.runner, &alternatives).await?;

        match log.succeeded_with() {
            Some(label) => info!(
                "Package {} with {} succeeded",
                label,
                self.distro.package_manager()
            ),
            None => {
                error!("Every install alternative failed");
                return Err(ProvisionError::install(format!(
                    "Error occurred while installing the appliance package:\n{}",
                    log.failure_summary()
                )));
            }
        }

        self.verify_registered().await?;
        Ok(log)
    }

    /// Fail unless systemd knows the appliance unit
    pub async fn verify_registered(&mut self) -> Result<()> {
        match self.runner.sudo(&self.distro.registration_check()).await {
            Ok(_) => Ok(()),
            Err(ProvisionError::RemoteCommand { .. }) => {
                error!("{} not registered after installation", SERVICE_UNIT);
                Err(ProvisionError::ServiceNotRegistered(format!(
                    "{} missing from systemctl list-unit-files",
                    SERVICE_UNIT
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Try every `epel-release` candidate; succeeds if any installed
    async fn install_epel(&mut self) -> Result<()> {
        let listing = self
            .runner
            .sudo("yum search epel-release | awk '{print $1}' | grep epel-release")
            .await?;

        let mut installed = false;
        for package in listing.lines().map(str::trim).filter(|p| !p.is_empty()) {
            if self
                .runner
                .sudo(&format!("yum install -y {}", package))
                .await
                .is_ok()
            {
                installed = true;
            }
        }

        if installed {
            Ok(())
        } else {
            Err(ProvisionError::install(format!(
                "No epel-release package could be installed. Candidates:\n{}",
                listing
            )))
        }
    }

    /// Remove the package, confirm the unit is gone and clear `install_root`
    pub async fn uninstall(&mut self, install_root: &str) -> Result<()> {
        self.runner
            .sudo_best_effort(self.distro.removal_command())
            .await;

        if self
            .runner
            .sudo(&self.distro.registration_check())
            .await
            .is_ok()
        {
            error!("{} still registered after removal", SERVICE_UNIT);
            return Err(ProvisionError::install(
                "Appliance package still present after uninstallation",
            ));
        }

        self.runner
            .sudo(&format!("rm -rf {}/*", install_root))
            .await
            .map_err(|e| {
                ProvisionError::install(format!("Error clearing {}: {}", install_root, e))
            })?;
        Ok(())
    }
}
