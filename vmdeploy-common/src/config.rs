use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use crate::error::{ConfigError, CredentialError};

pub const DEFAULT_VCENTER_PORT: u16 = 443;

/// Top-level configuration document.
///
/// Unknown keys are ignored so the same file can carry settings for other
/// tools; missing required keys are a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub vcenter: ConnectionSettings,
    pub vms: Vec<VmDeploymentRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub username: String,
    /// Name of the environment variable holding the password.
    pub password_env: String,
    #[serde(default = "default_validate_certs")]
    pub validate_certs: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// One entry of the `vms` list: a single clone attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDeploymentRequest {
    pub name: String,
    pub template: String,
    pub datacenter: String,
    pub cluster: String,
    pub datastore: String,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Resolver priority order, kept as written. IPv4 or IPv6.
    #[serde(default)]
    pub dns: Vec<IpAddr>,
}

fn default_validate_certs() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_VCENTER_PORT
}

impl DeploymentConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: DeploymentConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks serde cannot express: non-empty names, unique VM names and
    /// contiguous netmasks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("vcenter.host", &self.vcenter.host)?;
        non_empty("vcenter.username", &self.vcenter.username)?;
        non_empty("vcenter.password_env", &self.vcenter.password_env)?;

        let mut seen = HashSet::new();
        for (idx, vm) in self.vms.iter().enumerate() {
            vm.validate(idx)?;
            if !seen.insert(vm.name.as_str()) {
                return Err(ConfigError::DuplicateVmName(vm.name.clone()));
            }
        }
        Ok(())
    }
}

impl ConnectionSettings {
    /// Look up the password in the environment variable named by
    /// `password_env`.
    pub fn password_from_env(&self) -> Result<String, CredentialError> {
        match std::env::var(&self.password_env) {
            Ok(value) if value.is_empty() => Err(CredentialError::Empty(self.password_env.clone())),
            Ok(value) => Ok(value),
            Err(_) => Err(CredentialError::Missing(self.password_env.clone())),
        }
    }
}

impl VmDeploymentRequest {
    fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        for (field, value) in [
            ("name", &self.name),
            ("template", &self.template),
            ("datacenter", &self.datacenter),
            ("cluster", &self.cluster),
            ("datastore", &self.datastore),
        ] {
            non_empty(&format!("vms[{}].{}", idx, field), value)?;
        }

        if !is_contiguous_mask(self.network.netmask) {
            return Err(ConfigError::InvalidNetmask {
                vm: self.name.clone(),
                netmask: self.network.netmask.to_string(),
            });
        }
        Ok(())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    // A prefix mask inverted is 0..01..1, so adding one yields a power of two.
    let inverted = !bits;
    inverted & inverted.wrapping_add(1) == 0
}
