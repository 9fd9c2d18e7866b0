// file: src/appliance/render.rs
// version: 1.0.0
// guid: 71a9e4c6-0f3b-4d28-a5e7-c94b2d16f803

//! Deterministic rendering of the appliance configuration file

use super::instance::ADMIN_USER;
use crate::config::{ApplianceSettings, StaticRoute};
use std::fmt;

/// First line of every generated configuration file
pub const GENERATED_BY: &str = "#blx.conf generated by blx-provisioner#";

/// Lines containing this flag carry a secret
const PASSWORD_FLAG: &str = "-password";

const REDACTED: &str = "<PASSWD>";

/// A named `name { ... }` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    pub name: &'static str,
    pub lines: Vec<String>,
}

impl ConfigBlock {
    fn push_into(&self, out: &mut Vec<String>) {
        out.push(self.name.to_string());
        out.push("{".to_string());
        out.extend(self.lines.iter().cloned());
        out.push("}".to_string());
    }
}

/// Ordered configuration blocks for one appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub blocks: Vec<ConfigBlock>,
}

impl ConfigDocument {
    /// Build the three blocks in file order: system config, static routes, CLI commands
    pub fn build(
        settings: &ApplianceSettings,
        routes: &[StaticRoute],
        cli_commands: &[String],
        admin_password: &str,
    ) -> Self {
        Self {
            blocks: vec![
                system_config_block(settings),
                static_routes_block(settings.default_gateway.as_deref(), routes),
                cli_commands_block(cli_commands, admin_password),
            ],
        }
    }

    pub fn block(&self, name: &str) -> Option<&ConfigBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// File content, one entry per line, marker first
    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![GENERATED_BY.to_string()];
        for block in &self.blocks {
            block.push_into(&mut out);
        }
        out
    }

    /// [`Self::lines`] with the value after every `-password` flag replaced
    pub fn redacted_lines(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| redact_line(&l)).collect()
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.redacted_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

fn redact_line(line: &str) -> String {
    match line.find(PASSWORD_FLAG) {
        Some(pos) => format!("{} {}", &line[..pos + PASSWORD_FLAG.len()], REDACTED),
        None => line.to_string(),
    }
}

/// Populated settings as `key: value` entries
pub fn system_config_block(settings: &ApplianceSettings) -> ConfigBlock {
    ConfigBlock {
        name: "blx-system-config",
        lines: settings
            .system_config_entries()
            .into_iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect(),
    }
}

/// Default route first, then the extra routes in declaration order
pub fn static_routes_block(default_gateway: Option<&str>, routes: &[StaticRoute]) -> ConfigBlock {
    let mut lines: Vec<String> = default_gateway
        .filter(|gw| !gw.is_empty())
        .map(|gw| format!("default {}", gw))
        .into_iter()
        .collect();
    lines.extend(
        routes
            .iter()
            .map(|r| format!("{} {}", r.destination, r.gateway)),
    );
    ConfigBlock {
        name: "static-routes",
        lines,
    }
}

/// Caller commands verbatim, then exactly one admin-password command
pub fn cli_commands_block(cli_commands: &[String], admin_password: &str) -> ConfigBlock {
    let mut lines = cli_commands.to_vec();
    lines.push(format!(
        "set system user {} {} {}",
        ADMIN_USER, PASSWORD_FLAG, admin_password
    ));
    ConfigBlock {
        name: "cli-cmds",
        lines,
    }
}
