use std::path::PathBuf;
use thiserror::Error;

/// Problems with the configuration document. All of these are raised before
/// any connection attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config field `{field}` must not be empty")]
    EmptyField { field: String },

    #[error("vm name `{0}` appears more than once")]
    DuplicateVmName(String),

    #[error("vm `{vm}`: netmask {netmask} is not a contiguous prefix mask")]
    InvalidNetmask { vm: String, netmask: String },
}

/// The password is never stored in the file, only the name of the variable
/// that holds it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("environment variable '{0}' not set")]
    Missing(String),

    #[error("environment variable '{0}' is empty")]
    Empty(String),
}
