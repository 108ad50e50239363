//! Clone-and-customize workflow.
//!
//! One deployment request runs resolve → build → submit → wait; the
//! orchestrator runs requests one after another inside a single scoped
//! session.

pub mod app;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod provider_manager;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod spec_builder;
pub mod submitter;
pub mod task_waiter;

pub use error::{DeployError, FailureStage};
pub use orchestrator::{OutcomeStatus, RunReport, VmOutcome};
pub use task_waiter::WaitPolicy;
