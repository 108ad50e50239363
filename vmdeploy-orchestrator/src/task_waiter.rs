use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use vmdeploy_providers::{Session, TaskHandle, TaskState};

use crate::error::DeployError;

/// How long to wait on a clone task, and how often to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Block until `task` is terminal or the policy's ceiling is hit.
///
/// Hitting the ceiling does not cancel the server-side task.
pub async fn wait_for_task(
    session: &dyn Session,
    task: &TaskHandle,
    policy: WaitPolicy,
) -> Result<(), DeployError> {
    let started = Instant::now();
    match timeout(policy.timeout, poll_until_terminal(session, task, policy.poll_interval)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(task = %task, waited = ?started.elapsed(), "clone task wait timed out");
            Err(DeployError::TaskTimeout {
                task: task.to_string(),
                waited: policy.timeout,
            })
        }
    }
}

async fn poll_until_terminal(
    session: &dyn Session,
    task: &TaskHandle,
    poll_interval: Duration,
) -> Result<(), DeployError> {
    let mut last_state: Option<&'static str> = None;
    loop {
        let info = session
            .task_info(task)
            .await
            .map_err(|source| DeployError::TaskPoll {
                task: task.to_string(),
                source,
            })?;

        let label = info.state.label();
        if last_state != Some(label) {
            info!(task = %task, state = label, progress = ?info.progress, "task state");
            last_state = Some(label);
        } else {
            debug!(task = %task, state = label, progress = ?info.progress, "task poll");
        }

        match info.state {
            TaskState::Success => return Ok(()),
            TaskState::Error(fault) => {
                return Err(DeployError::TaskFailed {
                    kind: fault.kind,
                    message: fault.message,
                })
            }
            TaskState::Queued | TaskState::Running => sleep(poll_interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmdeploy_providers::mock::{MockCall, MockInventory, MockProvider};
    use vmdeploy_providers::{
        CloneSpecification, ConnectionParams, CustomizationSpec, GlobalIpSettings, LinuxPrep,
        ManagedObjectRef, RelocationSpec, VirtualizationProvider,
    };

    fn fast() -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn spec() -> CloneSpecification {
        CloneSpecification {
            location: RelocationSpec {
                datastore: ManagedObjectRef::new("Datastore", "datastore-1"),
                pool: ManagedObjectRef::new("ResourcePool", "resgroup-1"),
            },
            customization: CustomizationSpec {
                identity: LinuxPrep {
                    host_name: "vm".into(),
                    domain: "localdomain".into(),
                },
                global_ip_settings: GlobalIpSettings {
                    dns_server_list: vec![],
                },
                nic_setting_map: vec![],
            },
            power_on: true,
        }
    }

    async fn start_clone(inv: MockInventory, vm: &str) -> (MockProvider, std::sync::Arc<dyn Session>, TaskHandle) {
        let provider = MockProvider::new(inv);
        let session = provider
            .connect(&ConnectionParams {
                host: "mock".into(),
                port: 443,
                username: "u".into(),
                password: "p".into(),
                validate_certs: true,
            })
            .await
            .unwrap();
        let task = session
            .clone_vm(
                &ManagedObjectRef::new("VirtualMachine", "vm-1"),
                &ManagedObjectRef::new("Folder", "group-v1"),
                vm,
                &spec(),
            )
            .await
            .unwrap();
        (provider, session, task)
    }

    #[tokio::test]
    async fn waits_through_queued_and_running() {
        let (provider, session, task) =
            start_clone(MockInventory::new().with_task_progress(2, 3), "web-01").await;
        wait_for_task(session.as_ref(), &task, fast()).await.unwrap();

        let polls = provider
            .journal()
            .iter()
            .filter(|c| matches!(c, MockCall::Poll { .. }))
            .count();
        assert_eq!(polls, 6);
    }

    #[tokio::test]
    async fn surfaces_platform_fault() {
        let inv = MockInventory::new().fail_task(
            "web-01",
            "InsufficientResources",
            "Insufficient resources to satisfy configured failover level.",
        );
        let (_provider, session, task) = start_clone(inv, "web-01").await;

        match wait_for_task(session.as_ref(), &task, fast()).await {
            Err(DeployError::TaskFailed { kind, message }) => {
                assert_eq!(kind, "InsufficientResources");
                assert!(message.contains("failover level"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn gives_up_after_the_ceiling() {
        let (_provider, session, task) =
            start_clone(MockInventory::new().stall_task("web-01"), "web-01").await;
        let policy = WaitPolicy {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        };

        match wait_for_task(session.as_ref(), &task, policy).await {
            Err(DeployError::TaskTimeout { task: id, waited }) => {
                assert_eq!(id, task.to_string());
                assert_eq!(waited, Duration::from_millis(50));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_failure_is_not_a_task_failure() {
        let (_provider, session, task) = start_clone(MockInventory::new(), "web-01").await;
        session.disconnect().await.unwrap();

        let err = wait_for_task(session.as_ref(), &task, fast()).await.unwrap_err();
        assert!(matches!(err, DeployError::TaskPoll { .. }));
    }
}
