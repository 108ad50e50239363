use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;
use vmdeploy_common::VmDeploymentRequest;
use vmdeploy_providers::{Session, TaskHandle};

use crate::error::{DeployError, FailureStage};
use crate::logger;
use crate::resolver::resolve_placement;
use crate::spec_builder::build_clone_spec;
use crate::submitter::submit;
use crate::task_waiter::{wait_for_task, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Deployed,
    Failed,
}

/// Result of one deployment request.
#[derive(Debug, Clone, Serialize)]
pub struct VmOutcome {
    pub name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    /// Clone task id, once one was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl VmOutcome {
    pub fn is_deployed(&self) -> bool {
        self.status == OutcomeStatus::Deployed
    }
}

/// One run over a config file. Outcomes are in input order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<VmOutcome>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_deployed()).count()
    }

    /// `0` when every VM deployed (or there were none), `2` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed_count() == 0 {
            0
        } else {
            2
        }
    }
}

/// Resolve, build, submit and wait for one VM.
///
/// Returns the task handle on success so the outcome can carry it. On failure
/// the handle is returned alongside the error if submission got that far.
pub async fn deploy_one(
    session: &dyn Session,
    request: &VmDeploymentRequest,
    policy: WaitPolicy,
) -> Result<TaskHandle, (DeployError, Option<TaskHandle>)> {
    let placement = resolve_placement(session, request)
        .await
        .map_err(|e| (e, None))?;
    let spec = build_clone_spec(&placement, &request.network, &request.name);
    let task = submit(session, &placement.template, &placement.folder, &request.name, &spec)
        .await
        .map_err(|e| (e, None))?;
    match wait_for_task(session, &task, policy).await {
        Ok(()) => Ok(task),
        Err(e) => Err((e, Some(task))),
    }
}

/// Deploy every request in order. A failed VM is recorded and the loop moves
/// on; nothing here aborts the run.
pub async fn run(
    session: &dyn Session,
    requests: &[VmDeploymentRequest],
    policy: WaitPolicy,
) -> RunReport {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, vms = requests.len());

    async move {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            let vm_started = Utc::now();
            logger::vm_attempt(&request.name, &request.template);

            let outcome = match deploy_one(session, request, policy)
                .instrument(tracing::info_span!("vm", name = %request.name))
                .await
            {
                Ok(task) => {
                    logger::vm_deployed(&request.name);
                    VmOutcome {
                        name: request.name.clone(),
                        status: OutcomeStatus::Deployed,
                        error: None,
                        failure_stage: None,
                        task: Some(task.to_string()),
                        started_at: vm_started,
                        finished_at: Utc::now(),
                    }
                }
                Err((err, task)) => {
                    logger::vm_failed(&request.name, &err);
                    VmOutcome {
                        name: request.name.clone(),
                        status: OutcomeStatus::Failed,
                        error: Some(err.to_string()),
                        failure_stage: Some(err.stage()),
                        task: task.map(|t| t.to_string()),
                        started_at: vm_started,
                        finished_at: Utc::now(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }
    .instrument(span)
    .await
}
