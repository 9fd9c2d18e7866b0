// file: src/config/loader.rs
// version: 2.0.0
// guid: d4e5f6g7-h8i9-0123-4567-890123defghi

//! Desired-state file loading and environment variable substitution

use super::DesiredState;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader seeded from the process environment
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load and validate a desired-state document (YAML, or TOML by extension)
    pub fn load_desired_state<P: AsRef<Path>>(&self, path: P) -> Result<DesiredState> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            crate::ProvisionError::config(format!(
                "Failed to read desired-state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let state = self.parse(path, &expanded)?;
        state.ensure_valid()?;

        debug!("Loaded desired state from {}", path.display());
        Ok(state)
    }

    /// Load a document without validating it, e.g. a previous revision
    pub fn load_unchecked<P: AsRef<Path>>(&self, path: P) -> Result<DesiredState> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let expanded = self.expand_env_vars(&content)?;
        self.parse(path, &expanded)
    }

    fn parse(&self, path: &Path, content: &str) -> Result<DesiredState> {
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        if is_toml {
            Ok(toml::from_str(content)?)
        } else {
            Ok(serde_yaml::from_str(content)?)
        }
    }

    /// Expand `${VAR}` references in document content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
            crate::ProvisionError::config(format!("Invalid regex pattern: {}", e))
        })?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else if !missing_vars.iter().any(|m| m == var_name) {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(crate::ProvisionError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
