use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::process;
use tracing::error;

use vmdeploy_orchestrator::app::{self, AppError};
use vmdeploy_orchestrator::logger;
use vmdeploy_orchestrator::provider_manager::ProviderManager;
use vmdeploy_orchestrator::settings::{parse_error_exit_code, Cli};
use vmdeploy_orchestrator::RunReport;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logger::init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(parse_error_exit_code(&e));
        }
    };

    let kind = cli.provider;
    let result = app::execute(&cli.config, cli.wait_policy(), |config| {
        ProviderManager::get_provider(kind, config)
            .ok_or_else(|| AppError::UnknownProvider(kind.as_str().to_string()))
    })
    .await;

    let code = app::exit_code(&result);
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", e.abort_message());
            error!(error = %e, "run aborted");
            process::exit(code);
        }
    };

    logger::run_summary(&report);

    if let Some(path) = &cli.report_json {
        if let Err(e) = write_report(path, &report) {
            eprintln!("⚠️  {:#}", e);
            error!(error = %format!("{e:#}"), "report not written");
        }
    }

    process::exit(code);
}

fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("writing run report to {}", path.display()))?;
    Ok(())
}
