// file: src/appliance/lifecycle.rs
// version: 1.1.0
// guid: e6b13f7a-58d2-4c9e-a041-7d2f9b8c3e15

//! Appliance lifecycle orchestration.
//!
//! An [`Orchestrator`] owns up to two sessions: the host shell and the
//! appliance management shell. Every step is strictly sequential. Stop
//! always ends with a fresh host session and a re-initialised host, so
//! anything that follows a stop can use the host runner.
//!
//! ```text
//! Uninitialized -> HostReady -> ArtifactInstalled -> [DriversReady]
//!     -> Configured -> Started -> Stabilized
//! any state --stop--> Stopped
//! ```

use super::distro::{self, DistroKind};
use super::host_tuning::HostTuner;
use super::instance::{ApplianceInstance, FilePathSet, ADMIN_USER, INSTALL_ROOT};
use super::offload::OffloadInstaller;
use super::package::PackageInstaller;
use crate::config::DesiredState;
use crate::network::transfer::{fetch, push_text};
use crate::network::{
    run_appliance_shell, Connector, CredentialDelivery, HostRunner, ReachabilityProbe,
    RemoteShell, ScratchFileDelivery,
};
use crate::{ProvisionError, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Appliance configuration file on the host
pub const CONFIG_FILE: &str = "/etc/blx/blx.conf";

/// Where the appliance reads its license files
pub const LICENSE_PATH: &str = "/nsconfig/license";

/// Packet engine process; its count tells whether the appliance is running
pub const WORKER_PROCESS: &str = "/usr/sbin/nsppe";

/// Extra restarts when a pooled-license directive is configured
const POOLED_LICENSE_RESTARTS: usize = 2;

/// Interface and route dump captured on every host init
const HOST_DIAGNOSTICS: [&str; 3] = ["ip -br addr show", "ip -o link", "ip route show"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    HostReady,
    ArtifactInstalled,
    DriversReady,
    Configured,
    Started,
    Stabilized,
    Stopped,
}

/// Which session an operation starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Setup,
    Update,
    Destroy,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Setup => write!(f, "setup"),
            Operation::Update => write!(f, "update"),
            Operation::Destroy => write!(f, "destroy"),
        }
    }
}

/// Every wait and retry budget in one place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    /// Management-port readiness after a launch
    pub readiness: ReachabilityProbe,
    pub stop_poll_attempts: u32,
    pub stop_poll_interval: Duration,
    pub launch_settle: Duration,
    pub stop_settle: Duration,
    pub stabilization: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            readiness: ReachabilityProbe::default(),
            stop_poll_attempts: 60,
            stop_poll_interval: Duration::from_secs(2),
            launch_settle: Duration::from_secs(10),
            stop_settle: Duration::from_secs(5),
            stabilization: Duration::from_secs(90),
        }
    }
}

/// Drives one appliance through its lifecycle
pub struct Orchestrator<C: Connector> {
    connector: C,
    instance: ApplianceInstance,
    delivery: Box<dyn CredentialDelivery>,
    timings: LifecycleTimings,
    host: Option<C::Shell>,
    appliance: Option<C::Shell>,
    state: LifecycleState,
}

impl<C: Connector> Orchestrator<C> {
    /// Elevation defaults to the scratch-file helper fed with the host password
    pub fn new(connector: C, instance: ApplianceInstance) -> Self {
        let delivery = ScratchFileDelivery::new(instance.desired().host.elevation_password());
        Self {
            connector,
            instance,
            delivery: Box::new(delivery),
            timings: LifecycleTimings::default(),
            host: None,
            appliance: None,
            state: LifecycleState::Uninitialized,
        }
    }

    /// Validate `desired` and build an orchestrator; nothing is contacted yet
    pub fn from_desired(connector: C, desired: DesiredState) -> Result<Self> {
        Ok(Self::new(connector, ApplianceInstance::new(desired)?))
    }

    pub fn with_delivery(mut self, delivery: Box<dyn CredentialDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn instance(&self) -> &ApplianceInstance {
        &self.instance
    }

    /// Install, tune the host, set up offload hardware, configure and start
    pub async fn setup(&mut self) -> Result<()> {
        self.attach(Operation::Setup).await?;

        self.install().await?;
        info!("Installation of appliance {} succeeded", self.instance.id());

        let distro = self.distro()?;
        HostTuner::new(self.host_runner()?, distro).apply().await;

        if !self.instance.desired().offload.is_empty() {
            self.setup_offload().await?;
        }

        self.configure().await?;
        info!("Initialization of appliance {} succeeded", self.instance.id());
        Ok(())
    }

    /// Reinstall when the artifact changed, then reconfigure and restart
    pub async fn update(&mut self, source_changed: bool) -> Result<()> {
        self.attach(Operation::Update).await?;

        if source_changed {
            info!("Artifact source changed, reinstalling");
            self.install().await?;
        }
        self.configure().await
    }

    /// Stop the appliance. The package stays installed.
    pub async fn destroy(&mut self) -> Result<()> {
        self.attach(Operation::Destroy).await?;
        self.stop().await?;
        info!("Stopping of appliance {} succeeded", self.instance.id());
        Ok(())
    }

    /// Stop, remove the package and clear the install root
    pub async fn uninstall(&mut self) -> Result<()> {
        self.stop().await?;
        let distro = self.distro()?;
        let paths = self.paths()?.clone();
        PackageInstaller::new(self.host_runner()?, distro, &paths.package_dir)
            .uninstall(&paths.install_root)
            .await?;
        self.state = LifecycleState::Uninitialized;
        info!("Uninstallation of appliance {} succeeded", self.instance.id());
        Ok(())
    }

    /// Open the session `operation` starts from and initialise the host if connected
    pub async fn attach(&mut self, operation: Operation) -> Result<()> {
        match operation {
            Operation::Setup => self.connect_host().await?,
            Operation::Update | Operation::Destroy => {
                let target = self.instance.appliance_target();
                match self.connector.connect(&target).await {
                    Ok(session) => {
                        info!(
                            "Connected to appliance {}:{} for {}",
                            target.address, target.port, operation
                        );
                        self.appliance = Some(session);
                    }
                    Err(e) => {
                        warn!(
                            "Appliance {}:{} unavailable for {} ({}), using the host session",
                            target.address, target.port, operation, e
                        );
                        self.connect_host().await?;
                    }
                }
            }
        }

        if self.host.is_some() {
            self.host_init().await?;
        }
        Ok(())
    }

    async fn connect_host(&mut self) -> Result<()> {
        if let Some(mut old) = self.host.take() {
            old.disconnect();
        }
        let target = self.instance.host_target();
        let session = self.connector.connect(&target).await.map_err(|e| {
            error!(
                "Unable to connect to host {}:{}: {}",
                target.address, target.port, e
            );
            e
        })?;
        self.host = Some(session);
        Ok(())
    }

    /// Create and resolve the install root, detect the distro once, dump interfaces and routes
    pub async fn host_init(&mut self) -> Result<()> {
        let host = self
            .host
            .as_mut()
            .ok_or_else(|| ProvisionError::ssh("No host session"))?;
        let mut runner = HostRunner::new(host, self.delivery.as_ref(), None);

        runner.run(&format!("mkdir -p {}", INSTALL_ROOT)).await?;
        let resolved = runner.run(&format!("cd {} ; pwd", INSTALL_ROOT)).await?;
        let paths = FilePathSet::under(resolved.trim());

        if self.instance.distro.is_none() {
            self.instance.distro = Some(distro::detect(&mut runner).await?);
        }

        let mut runner = HostRunner::new(
            runner_shell(&mut self.host)?,
            self.delivery.as_ref(),
            Some(&paths.install_root),
        );
        for command in HOST_DIAGNOSTICS {
            if let Some(output) = runner.sudo_best_effort(command).await {
                debug!("{}:\n{}", command, output.trim_end());
            }
        }

        debug!("Install root resolved to {}", paths.install_root);
        self.instance.paths = Some(paths);
        if self.state == LifecycleState::Uninitialized {
            self.state = LifecycleState::HostReady;
        }
        Ok(())
    }

    /// Stop, then fetch and install the package
    pub async fn install(&mut self) -> Result<()> {
        self.stop().await?;

        let distro = self.distro()?;
        let paths = self.paths()?.clone();
        let source = self.instance.desired().source.clone();

        PackageInstaller::new(self.host_runner()?, distro, &paths.package_dir)
            .install(&source)
            .await?;
        self.state = LifecycleState::ArtifactInstalled;
        Ok(())
    }

    pub async fn setup_offload(&mut self) -> Result<()> {
        let distro = self.distro()?;
        let paths = self.paths()?.clone();
        let artifacts = self.instance.desired().offload.clone();

        OffloadInstaller::new(self.host_runner()?, distro, &paths.driver_dir)
            .install(&artifacts)
            .await?;
        self.state = LifecycleState::DriversReady;
        Ok(())
    }

    /// Stop, write config, stage licenses, refresh helper scripts, then start
    pub async fn configure(&mut self) -> Result<()> {
        self.stop().await?;
        self.write_config().await?;
        if !self.instance.desired().licenses.is_empty() {
            self.install_licenses().await?;
        }
        self.write_helper_scripts().await?;
        self.state = LifecycleState::Configured;

        self.start().await
    }

    async fn write_config(&mut self) -> Result<()> {
        let document = self.instance.render_config();
        let mut runner = self.host_runner()?;

        runner
            .sudo(&format!("> {}", CONFIG_FILE))
            .await
            .map_err(|e| {
                error!("Error clearing {}: {}", CONFIG_FILE, e);
                e
            })?;
        push_text(&mut runner, CONFIG_FILE, &document.lines()).await?;

        if let Some(content) = runner
            .sudo_best_effort(&format!("grep -v -- '-password' {}", CONFIG_FILE))
            .await
        {
            info!("Printing blx.conf -\n{}", content);
        }
        Ok(())
    }

    async fn install_licenses(&mut self) -> Result<()> {
        let paths = self.paths()?.clone();
        let licenses = self.instance.desired().licenses.clone();
        let mut runner = self.host_runner()?;

        for license in &licenses {
            fetch(&mut runner, license, &paths.license_dir)
                .await
                .map_err(|e| {
                    ProvisionError::transfer(format!(
                        "Error copying license file {}: {}",
                        license, e
                    ))
                })?;
        }

        runner
            .sudo(&format!("mv -f {}/* {}", paths.license_dir, LICENSE_PATH))
            .await?;
        runner
            .sudo(&format!("chown {} {}/*", ADMIN_USER, LICENSE_PATH))
            .await?;
        runner
            .sudo_best_effort(&format!("rm -rf {}", paths.license_dir))
            .await;
        info!("Installed {} license file(s)", licenses.len());
        Ok(())
    }

    async fn write_helper_scripts(&mut self) -> Result<()> {
        let paths = self.paths()?.clone();
        let mut runner = self.host_runner()?;

        let stop = ["systemctl stop blx", "sleep 2"].map(String::from);
        push_text(&mut runner, &paths.stop_script, &stop)
            .await
            .map_err(|e| ProvisionError::transfer(format!("Error creating stop script: {}", e)))?;

        let start = ["sleep 2", "systemctl restart blx"].map(String::from);
        push_text(&mut runner, &paths.start_script, &start)
            .await
            .map_err(|e| ProvisionError::transfer(format!("Error creating start script: {}", e)))?;
        Ok(())
    }

    /// Launch, restart twice for pooled licensing, then let the ports settle
    pub async fn start(&mut self) -> Result<()> {
        self.launch().await.map_err(|e| {
            error!("Error returned while starting appliance: {}", e);
            e
        })?;
        self.state = LifecycleState::Started;

        if self.instance.uses_pooled_licensing() {
            info!(
                "License server configuration detected, restarting {} twice",
                self.instance.id()
            );
            for _ in 0..POOLED_LICENSE_RESTARTS {
                self.restart().await?;
            }
        }

        info!(
            "{} is reachable, waiting {}s for ports to come up",
            self.instance.id(),
            self.timings.stabilization.as_secs()
        );
        tokio::time::sleep(self.timings.stabilization).await;
        self.state = LifecycleState::Stabilized;
        Ok(())
    }

    /// Run the start script in the background and wait for the management port
    async fn launch(&mut self) -> Result<()> {
        let paths = self.paths()?.clone();
        self.host_runner()?
            .sudo(&format!(
                "nohup bash {} > {} 2>&1 &",
                paths.start_script, paths.start_log
            ))
            .await?;

        tokio::time::sleep(self.timings.launch_settle).await;

        let address = self.instance.id();
        let port = self.instance.management_port();
        self.timings
            .readiness
            .wait(&self.connector, &address, port)
            .await
            .map_err(|e| ProvisionError::ReadinessTimeout {
                address,
                port,
                attempts: e.attempts,
            })?;
        Ok(())
    }

    async fn restart(&mut self) -> Result<()> {
        debug!("Stopping appliance for restart");
        self.stop().await?;
        debug!("Starting appliance for restart");
        self.launch().await
    }

    /// Stop through the appliance shell if attached, reconnect to the host,
    /// stop again there and wait until no worker process remains
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut session) = self.appliance.take() {
            if let Err(e) = run_appliance_shell(&mut session, "systemctl stop blx").await {
                warn!("Stop through the appliance shell failed: {}", e);
            }
            session.disconnect();
        }
        tokio::time::sleep(self.timings.stop_settle).await;

        self.connect_host().await?;
        self.host_init().await?;

        let paths = self.paths()?.clone();
        let mut runner = self.host_runner()?;
        runner.sudo_best_effort("systemctl stop blx").await;
        runner
            .sudo_best_effort(&format!(
                "nohup bash {} > {} 2>&1 &",
                paths.stop_script, paths.stop_log
            ))
            .await;

        self.wait_for_exit().await?;
        self.state = LifecycleState::Stopped;
        Ok(())
    }

    async fn wait_for_exit(&mut self) -> Result<()> {
        let attempts = self.timings.stop_poll_attempts;
        let mut remaining = 0;
        for attempt in 1..=attempts {
            remaining = self.process_count().await?;
            if remaining == 0 {
                debug!("No appliance processes left (check {})", attempt);
                return Ok(());
            }
            debug!(
                "{} appliance processes still running (check {})",
                remaining, attempt
            );
            if attempt < attempts {
                tokio::time::sleep(self.timings.stop_poll_interval).await;
            }
        }
        error!("Appliance processes still running after stop");
        Err(ProvisionError::ProcessLingering {
            remaining,
            attempts,
        })
    }

    async fn process_count(&mut self) -> Result<usize> {
        let output = self
            .host_runner()?
            .sudo(&format!(
                "ps aux | grep \"{}\" | grep -v grep | wc -l",
                WORKER_PROCESS
            ))
            .await?;
        output.trim().parse::<usize>().map_err(|_| {
            ProvisionError::remote_command(
                "appliance process count",
                format!("unexpected output: {}", output.trim()),
            )
        })
    }

    fn distro(&self) -> Result<DistroKind> {
        self.instance
            .distro
            .ok_or_else(|| ProvisionError::config("Host not initialised: distro unknown"))
    }

    fn paths(&self) -> Result<&FilePathSet> {
        self.instance
            .paths
            .as_ref()
            .ok_or_else(|| ProvisionError::config("Host not initialised: install root unknown"))
    }

    fn host_runner(&mut self) -> Result<HostRunner<'_, C::Shell>> {
        let workdir = self.instance.paths.as_ref().map(|p| p.install_root.as_str());
        let host = runner_shell(&mut self.host)?;
        Ok(HostRunner::new(host, self.delivery.as_ref(), workdir))
    }
}

fn runner_shell<S>(host: &mut Option<S>) -> Result<&mut S> {
    host.as_mut()
        .ok_or_else(|| ProvisionError::ssh("No host session"))
}

impl<C: Connector> Drop for Orchestrator<C> {
    fn drop(&mut self) {
        if let Some(mut session) = self.appliance.take() {
            session.disconnect();
        }
        if let Some(mut session) = self.host.take() {
            session.disconnect();
        }
    }
}
