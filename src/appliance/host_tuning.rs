// file: src/appliance/host_tuning.rs
// version: 1.0.0
// guid: 9a47d3b1-e28c-4f05-b6d9-31c8a7e0f452

//! Best-effort host preparation run once per Setup

use super::distro::DistroKind;
use crate::network::transfer::push_text;
use crate::network::{HostRunner, RemoteShell};
use tracing::{info, warn};

const RSYSLOG_DROP_IN: &str = "/etc/rsyslog.d/blx-rsyslog-enable.conf";

const CORE_DUMP_COMMANDS: [&str; 5] = [
    "mkdir -p /var/core",
    "echo '/var/core/core-%e-sig%s-user%u-group%g-pid%p-time%t' > /proc/sys/kernel/core_pattern",
    "printf '*       hard        core        unlimited\\n*       soft        core        unlimited\\n' > /etc/security/limits.d/core.conf",
    "sed -i -e 's/.*DefaultLimitCORE.*/DefaultLimitCORE=infinity/g' /etc/systemd/system.conf",
    "systemctl daemon-reexec",
];

/// Persisted appliance state removed before the first configuration
const STALE_CONFIG: [&str; 3] = ["/nsconfig/ns.conf*", "/configdb/nscfg.db", "/var/clusterd/*"];

/// Host tweaks whose failures are logged and never abort the run
pub struct HostTuner<'a, S: ?Sized> {
    runner: HostRunner<'a, S>,
    distro: DistroKind,
}

impl<'a, S> HostTuner<'a, S>
where
    S: RemoteShell + ?Sized,
{
    pub fn new(runner: HostRunner<'a, S>, distro: DistroKind) -> Self {
        Self { runner, distro }
    }

    pub async fn apply(&mut self) {
        self.disable_autostart().await;
        self.enable_core_dumps().await;
        self.enable_syslog_udp().await;
        self.clear_previous_config().await;
        info!("Host tuning finished");
    }

    /// The appliance must not come up on its own after a host reboot
    pub async fn disable_autostart(&mut self) {
        self.runner.sudo_best_effort("systemctl disable blx").await;
    }

    pub async fn enable_core_dumps(&mut self) {
        for cmd in CORE_DUMP_COMMANDS {
            self.runner.sudo_best_effort(cmd).await;
        }
    }

    pub async fn enable_syslog_udp(&mut self) {
        self.runner
            .sudo_best_effort(&format!("> {}", RSYSLOG_DROP_IN))
            .await;
        let directives = self.distro.syslog_udp_directives();
        if let Err(e) = push_text(&mut self.runner, RSYSLOG_DROP_IN, &directives).await {
            warn!("Unable to write {}: {}", RSYSLOG_DROP_IN, e);
        }
        self.runner
            .sudo_best_effort("systemctl restart rsyslog")
            .await;
    }

    pub async fn clear_previous_config(&mut self) {
        for path in STALE_CONFIG {
            self.runner.sudo_best_effort(&format!("rm -f {}", path)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PassthroughDelivery, ScriptedShell};

    #[tokio::test]
    async fn test_failures_do_not_stop_tuning() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        script.fail_on("systemctl", "Failed to connect to bus");
        let delivery = PassthroughDelivery;
        let runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        HostTuner::new(runner, DistroKind::Rpm).apply().await;

        assert_eq!(script.count_matching("rm -f /var/clusterd/*"), 1);
        assert_eq!(script.count_matching("systemctl restart rsyslog"), 1);
    }

    #[tokio::test]
    async fn test_rsyslog_directives_follow_distro() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        let delivery = PassthroughDelivery;
        let runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        HostTuner::new(runner, DistroKind::Deb)
            .enable_syslog_udp()
            .await;

        let content = script.uploaded_matching("blx-rsyslog-enable.conf").unwrap();
        assert_eq!(
            content,
            "module(load=\"imudp\")\ninput(type=\"imudp\" port=\"514\")\n"
        );
        assert!(script.position("> /etc/rsyslog.d/blx-rsyslog-enable.conf").unwrap()
            < script.position("mv -f").unwrap());
    }
}
