// file: src/cli/commands.rs
// version: 2.0.0
// guid: 2c8f61d4-7e0a-4b35-a9d2-f04e7b1c9856

//! Command implementations for the CLI

use crate::{
    appliance::{ApplianceInstance, Orchestrator},
    config::{loader::ConfigLoader, DesiredState},
    logging::with_async_operation_span,
    network::{ReachabilityProbe, SshConnector},
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

fn load(path: &Path) -> Result<DesiredState> {
    ConfigLoader::new()
        .load_desired_state(path)
        .with_context(|| format!("Invalid desired state in {}", path.display()))
}

fn orchestrator(state: DesiredState) -> Result<Orchestrator<SshConnector>> {
    let connector = SshConnector::new(ReachabilityProbe::default());
    Orchestrator::from_desired(connector, state).context("Invalid desired state")
}

/// Install, configure and start the appliance
pub async fn setup_command(config: &Path) -> Result<()> {
    let mut orch = orchestrator(load(config)?)?;
    let id = orch.instance().id();
    info!("Setting up appliance {}", id);

    with_async_operation_span("setup", || orch.setup())
        .await
        .with_context(|| format!("Setup of appliance {} failed", id))?;

    info!("Appliance {} is up", id);
    Ok(())
}

/// Whether the artifact must be reinstalled for this update
pub fn source_changed(current: &DesiredState, previous: Option<&DesiredState>, reinstall: bool) -> bool {
    reinstall || previous.is_some_and(|p| p.source != current.source)
}

/// Reconfigure and restart, reinstalling when the source changed
pub async fn update_command(config: &Path, previous: Option<&Path>, reinstall: bool) -> Result<()> {
    let state = load(config)?;
    let previous_state = match previous {
        Some(path) => Some(
            ConfigLoader::new()
                .load_unchecked(path)
                .with_context(|| format!("Unable to read previous state {}", path.display()))?,
        ),
        None => None,
    };
    let changed = source_changed(&state, previous_state.as_ref(), reinstall);

    let mut orch = orchestrator(state)?;
    let id = orch.instance().id();
    info!("Updating appliance {} (reinstall: {})", id, changed);

    with_async_operation_span("update", || orch.update(changed))
        .await
        .with_context(|| format!("Update of appliance {} failed", id))?;

    info!("Appliance {} updated", id);
    Ok(())
}

/// Stop the appliance
pub async fn destroy_command(config: &Path) -> Result<()> {
    let mut orch = orchestrator(load(config)?)?;
    let id = orch.instance().id();

    with_async_operation_span("destroy", || orch.destroy())
        .await
        .with_context(|| format!("Destroy of appliance {} failed", id))?;

    info!("Appliance {} stopped", id);
    Ok(())
}

/// Print the configuration document, redacted unless `show_secrets`
pub async fn render_command(config: &Path, show_secrets: bool) -> Result<()> {
    let instance = ApplianceInstance::new(load(config)?).context("Invalid desired state")?;
    let document = instance.render_config();
    let lines = if show_secrets {
        document.lines()
    } else {
        document.redacted_lines()
    };
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Validate and summarise the deployment
pub async fn validate_command(config: &Path, json: bool) -> Result<()> {
    let instance = ApplianceInstance::new(load(config)?).context("Invalid desired state")?;
    let host = instance.host_target();

    if json {
        let summary = serde_json::json!({
            "valid": true,
            "identity": instance.id(),
            "management_port": instance.management_port(),
            "management_mode": instance.management_mode(),
            "host": format!("{}:{}", host.address, host.port),
            "auth": host.auth.label(),
            "pooled_licensing": instance.uses_pooled_licensing(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Desired state is valid");
        println!("  identity:        {}", instance.id());
        println!("  management port: {}", instance.management_port());
        println!("  host:            {}@{}:{}", host.username, host.address, host.port);
        println!("  auth:            {}", host.auth.label());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(source: &str) -> DesiredState {
        serde_yaml::from_str(&format!(
            "source: {}\nhost:\n  ipaddress: 10.0.0.10\n  username: admin\npassword: pw\n",
            source
        ))
        .unwrap()
    }

    #[test]
    fn test_source_change_detection() {
        let current = state("https://example.com/blx-14.1.tar.gz");
        let same = state("https://example.com/blx-14.1.tar.gz");
        let older = state("https://example.com/blx-13.1.tar.gz");

        assert!(!source_changed(&current, None, false));
        assert!(!source_changed(&current, Some(&same), false));
        assert!(source_changed(&current, Some(&older), false));
        assert!(source_changed(&current, None, true));
    }
}
