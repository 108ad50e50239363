use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::DeployError;
use crate::orchestrator::RunReport;

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedding) is not an error worth reporting.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn connected(host: &str) {
    println!("🔗 Connected to vCenter '{}'.", host);
    info!(host, "connected");
}

/// Per-VM status lines on stdout, mirrored to tracing.
pub fn vm_attempt(vm: &str, template: &str) {
    println!("🔧 Cloning VM '{}' from template '{}'...", vm, template);
    info!(vm, template, "clone attempt");
}

pub fn vm_deployed(vm: &str) {
    println!("✅ VM '{}' deployed and powered on.", vm);
    info!(vm, "deployed");
}

pub fn vm_failed(vm: &str, err: &DeployError) {
    println!("❌ VM '{}' failed: {}", vm, err);
    error!(vm, stage = ?err.stage(), error = %err, "deployment failed");
}

pub fn run_summary(report: &RunReport) {
    let failed = report.failed_count();
    let total = report.outcomes.len();
    if failed == 0 {
        println!("📋 {} of {} VM(s) deployed.", total, total);
    } else {
        println!(
            "📋 {} of {} VM(s) deployed, {} failed.",
            total - failed,
            total,
            failed
        );
    }
    info!(run_id = %report.run_id, total, failed, "run finished");
}
