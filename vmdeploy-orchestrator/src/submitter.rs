use tracing::info;
use vmdeploy_providers::{CloneSpecification, ManagedObjectRef, Session, TaskHandle};

use crate::error::DeployError;
use crate::resolver::Resolved;

/// Issue exactly one clone request and return the task without waiting on it.
///
/// A synchronous refusal (name already taken, missing privilege, invalid
/// spec) is a `DeployError::Submission`, never retried.
pub async fn submit(
    session: &dyn Session,
    template: &Resolved,
    folder: &ManagedObjectRef,
    vm_name: &str,
    spec: &CloneSpecification,
) -> Result<TaskHandle, DeployError> {
    let task = session
        .clone_vm(&template.moref, folder, vm_name, spec)
        .await
        .map_err(DeployError::Submission)?;
    info!(vm = vm_name, template = %template.name, task = %task, "clone submitted");
    Ok(task)
}
