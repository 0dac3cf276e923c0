//! `ci`: one decision cycle from the newest slots export.
//!
//! Meant to run after a separate `--output-json` check, e.g. in a scheduled
//! pipeline. A missing export or target is not an error.

use std::process::ExitCode;

use chrono::Utc;
use slotwatch_core::AppConfig;
use slotwatch_monitor::{run_cycle, ConfiguredNotifier, CycleContext};
use slotwatch_scraper::{ExportSource, ScraperError, SlotSource};

use crate::EXIT_USAGE;

pub(crate) async fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let source = ExportSource::new(&config.artifacts_dir);
    let fetched = match source.fetch().await {
        Ok(fetched) => fetched,
        Err(ScraperError::NoExport { dir }) => {
            tracing::info!(dir = %dir.display(), "no slots export found, nothing to do");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to read latest slots export");
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };

    let Some(target) = config.target_provider.as_deref() else {
        tracing::info!("no target provider configured, nothing to do");
        return Ok(ExitCode::SUCCESS);
    };

    let notifier = ConfiguredNotifier::from_config(config)?;
    let ctx = CycleContext::from_config(config, target, notifier);
    let report = run_cycle(&ctx, &fetched, Utc::now()).await;

    tracing::info!(
        target,
        outcome = %report.outcome,
        notifications = report.notifications.len(),
        "ci run complete"
    );
    Ok(ExitCode::SUCCESS)
}
