//! One-shot availability check.
//!
//! Always prints a status line. Fetch failures are logged and reported as
//! "No available hours." so scripted callers get a stable answer. With
//! `--notify` the status is also sent through the configured notifier when
//! slots were found. The check never touches monitor state.

use std::process::ExitCode;

use chrono::Utc;
use slotwatch_core::AppConfig;
use slotwatch_monitor::{find_next_slot, send_best_effort, ConfiguredNotifier};
use slotwatch_scraper::{artifacts, FetchResult, PageSource, SlotSource, SlotsExport};

pub(crate) async fn run(
    config: &AppConfig,
    output_json: bool,
    notify: bool,
) -> anyhow::Result<ExitCode> {
    let source = PageSource::from_config(config)?;

    let fetched = match source.fetch().await {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::error!(error = %e, "availability check failed");
            println!("No available hours.");
            return Ok(ExitCode::SUCCESS);
        }
    };

    if output_json {
        write_export(config, &fetched);
    }

    let lines = status_lines(config, &fetched);
    for line in &lines {
        println!("{line}");
    }

    if notify {
        if let Some(message) = notification(&fetched, &lines) {
            let notifier = ConfiguredNotifier::from_config(config)?;
            send_best_effort(&notifier, &message).await;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Message sent by `--notify`: the status lines, only when slots were found.
pub(crate) fn notification(fetched: &FetchResult, lines: &[String]) -> Option<String> {
    (!fetched.slots.is_empty()).then(|| lines.join("\n"))
}

/// Lines printed for a completed check.
pub(crate) fn status_lines(config: &AppConfig, fetched: &FetchResult) -> Vec<String> {
    if fetched.slots.is_empty() {
        return vec!["No available hours.".to_owned()];
    }

    let mut lines = vec![format!(
        "Available hours found: {} slots.",
        fetched.slots.len()
    )];
    if let Some(target) = &config.target_provider {
        if let Some(next) = find_next_slot(&fetched.slots, target, config.horizon_days) {
            lines.push(format!(
                "Next slot for {target} within {} days: {}",
                config.horizon_days,
                next.time_text().unwrap_or_default()
            ));
        }
    }
    lines
}

/// Writes a `slots_<ts>.json` export, logging instead of failing. A blocked
/// fetch is exported too so the CI run still counts it as a failure.
pub(crate) fn write_export(config: &AppConfig, fetched: &FetchResult) {
    let export = SlotsExport::from_fetch(config.search_name.as_str(), fetched);
    if let Err(e) = artifacts::write_slots_export(&config.artifacts_dir, &export, Utc::now()) {
        tracing::error!(error = %e, "failed to write slots export");
    }
}
