use std::path::Path;
use thiserror::Error;
use tracing::info;
use vmdeploy_common::{ConfigError, CredentialError, DeploymentConfig};
use vmdeploy_providers::{ConnectionParams, ProviderError, VirtualizationProvider};

use crate::logger;
use crate::orchestrator::{self, RunReport};
use crate::session::ScopedSession;
use crate::task_waiter::WaitPolicy;

/// Errors that stop the run before the per-VM loop starts.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("provider '{0}' is not available in this build")]
    UnknownProvider(String),

    #[error("cannot connect: {0}")]
    Connect(#[source] ProviderError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, AppError::Connect(e) if e.is_authentication())
    }

    /// The one line printed when the run stops before the VM loop.
    pub fn abort_message(&self) -> String {
        match self {
            AppError::Connect(ProviderError::Authentication(msg)) => {
                format!("❌ Invalid login: {}", msg)
            }
            other => format!("❌ {}", other),
        }
    }
}

/// Process exit status for a finished (or aborted) run: `0` when every VM
/// deployed, `2` when any failed, `1` when the run never reached the VM loop.
pub fn exit_code(result: &Result<RunReport, AppError>) -> i32 {
    match result {
        Ok(report) => report.exit_code(),
        Err(e) => e.exit_code(),
    }
}

/// Load the config and the password. Nothing here touches the network.
pub fn prepare(config_path: &Path) -> Result<(DeploymentConfig, ConnectionParams), AppError> {
    let config = DeploymentConfig::load(config_path)?;
    let password = config.vcenter.password_from_env()?;
    let params = ConnectionParams {
        host: config.vcenter.host.clone(),
        port: config.vcenter.port,
        username: config.vcenter.username.clone(),
        password,
        validate_certs: config.vcenter.validate_certs,
    };
    info!(
        path = %config_path.display(),
        vms = config.vms.len(),
        host = %params.host,
        "config loaded"
    );
    Ok((config, params))
}

/// Connect once, deploy every request in order, then log out.
pub async fn deploy(
    provider: &dyn VirtualizationProvider,
    params: &ConnectionParams,
    config: &DeploymentConfig,
    policy: WaitPolicy,
) -> Result<RunReport, AppError> {
    let scope = ScopedSession::acquire(provider, params)
        .await
        .map_err(AppError::Connect)?;
    logger::connected(&params.host);
    let report = orchestrator::run(scope.session(), &config.vms, policy).await;
    // Logout failure does not change what was deployed.
    let _ = scope.release().await;
    Ok(report)
}

/// Full run for one config file. `select` picks the provider once the config
/// is known to be valid.
pub async fn execute<F>(
    config_path: &Path,
    policy: WaitPolicy,
    select: F,
) -> Result<RunReport, AppError>
where
    F: FnOnce(&DeploymentConfig) -> Result<Box<dyn VirtualizationProvider>, AppError>,
{
    let (config, params) = prepare(config_path)?;
    let provider = select(&config)?;
    deploy(provider.as_ref(), &params, &config, policy).await
}
