//! Shared configuration model for vmdeploy.
//!
//! The configuration file is parsed and validated here, before anything talks
//! to the management endpoint.

pub mod config;
pub mod error;

pub use config::{
    ConnectionSettings, DeploymentConfig, NetworkSettings, VmDeploymentRequest,
    DEFAULT_VCENTER_PORT,
};
pub use error::{ConfigError, CredentialError};
