// file: src/config/appliance.rs
// version: 1.0.0
// guid: 307c3b56-76cb-4a24-b6dd-a8a35d2c8f31

//! Desired-state description of one appliance deployment

use super::de;
use super::host::HostCredential;
use serde::Deserialize;
use validator::Validate;

/// Typed appliance settings; every field is optional and unset fields are
/// left out of the rendered configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplianceSettings {
    /// Dedicated management address, literal IP or CIDR form
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub ipaddress: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub interfaces: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub mgmt_ssh_port: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub mgmt_http_port: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub mgmt_https_port: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub worker_processes: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub nsdrvd: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub cpu_yield: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub default_gateway: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub total_hugepage_mem: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub blx_managed_host: Option<String>,
    #[serde(default, deserialize_with = "de::optional_scalar")]
    pub host_ipaddress: Option<String>,
}

impl ApplianceSettings {
    /// `blx.conf` key/value pairs for every populated setting, in a fixed order
    pub fn system_config_entries(&self) -> Vec<(&'static str, &str)> {
        let all: [(&'static str, &Option<String>); 11] = [
            ("worker-processes", &self.worker_processes),
            ("cpu-yield", &self.cpu_yield),
            ("ipaddress", &self.ipaddress),
            ("interfaces", &self.interfaces),
            ("mgmt-http-port", &self.mgmt_http_port),
            ("mgmt-https-port", &self.mgmt_https_port),
            ("mgmt-ssh-port", &self.mgmt_ssh_port),
            ("nsdrvd", &self.nsdrvd),
            ("host-ipaddress", &self.host_ipaddress),
            ("total-hugepage-mem", &self.total_hugepage_mem),
            ("blx-managed-host", &self.blx_managed_host),
        ];
        all.into_iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
            .filter(|(_, v)| !v.is_empty())
            .collect()
    }
}

/// One extra entry for the `static-routes` block
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticRoute {
    pub destination: String,
    pub gateway: String,
}

/// Hardware-offload driver artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OffloadArtifacts {
    /// Driver package image (URL or local path, optionally `.gz`)
    #[serde(default, alias = "mlx_ofed", deserialize_with = "de::optional_scalar")]
    pub ofed: Option<String>,
    /// Management tools tarball
    #[serde(default, alias = "mlx_tools", deserialize_with = "de::optional_scalar")]
    pub tools: Option<String>,
}

impl OffloadArtifacts {
    pub fn is_empty(&self) -> bool {
        self.ofed.is_none() && self.tools.is_none()
    }
}

/// Full desired state for one appliance
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DesiredState {
    /// Appliance package tarball, URL or local path
    #[validate(length(min = 1, message = "Artifact source must be set"))]
    pub source: String,
    #[validate(nested)]
    pub host: HostCredential,
    #[serde(default)]
    pub config: ApplianceSettings,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    /// Appliance admin password
    #[serde(default)]
    #[validate(length(min = 1, message = "Password field must be set for the appliance"))]
    pub password: String,
    #[serde(default, alias = "cli_cmd")]
    pub cli_commands: Vec<String>,
    #[serde(default, alias = "local_license")]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub offload: OffloadArtifacts,
}

impl DesiredState {
    /// Field and cross-field checks; runs before anything touches the network
    pub fn ensure_valid(&self) -> crate::Result<()> {
        self.validate()?;
        self.host.ensure_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_have_no_entries() {
        assert!(ApplianceSettings::default().system_config_entries().is_empty());
    }

    #[test]
    fn test_entries_skip_unset_values() {
        let settings = ApplianceSettings {
            worker_processes: Some("2".to_string()),
            default_gateway: Some("10.0.0.1".to_string()),
            interfaces: Some("eth1 eth2".to_string()),
            ..Default::default()
        };
        let entries = settings.system_config_entries();
        assert_eq!(
            entries,
            vec![("worker-processes", "2"), ("interfaces", "eth1 eth2")]
        );
    }

    #[test]
    fn test_original_key_aliases() {
        let doc = r#"
source: https://example.com/blx.tar.gz
host:
  ipaddress: 10.0.0.10
  username: admin
  password: pw
password: adminpw
cli_cmd:
  - "add ns ip 10.0.0.30 255.255.255.0"
local_license:
  - /tmp/a.lic
offload:
  mlx_ofed: /tmp/ofed.iso.gz
"#;
        let state: DesiredState = serde_yaml::from_str(doc).unwrap();
        assert_eq!(state.cli_commands.len(), 1);
        assert_eq!(state.licenses, vec!["/tmp/a.lic".to_string()]);
        assert_eq!(state.offload.ofed.as_deref(), Some("/tmp/ofed.iso.gz"));
        assert!(state.ensure_valid().is_ok());
    }

    #[test]
    fn test_missing_admin_password_rejected() {
        let doc = r#"
source: /tmp/blx.tar.gz
host: { ipaddress: 10.0.0.10, username: admin }
"#;
        let state: DesiredState = serde_yaml::from_str(doc).unwrap();
        let err = state.ensure_valid().unwrap_err();
        assert!(matches!(err, crate::ProvisionError::Validation(_)));
    }
}
