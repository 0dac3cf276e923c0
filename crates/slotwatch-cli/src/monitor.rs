//! `--monitor`: fetch, decide and sleep until interrupted.

use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use slotwatch_core::AppConfig;
use slotwatch_monitor::{fetch_for_cycle, run_cycle, ConfiguredNotifier, CycleContext, Notifier};
use slotwatch_scraper::{FetchResult, PageSource, SlotSource};
use tokio::task::JoinHandle;

use crate::check::write_export;
use crate::{shutdown_signal, EXIT_USAGE};

pub(crate) async fn run(config: &AppConfig, output_json: bool) -> anyhow::Result<ExitCode> {
    let Some(target) = config.target_provider.as_deref() else {
        eprintln!("Error: monitor mode requires --target-provider or SLOTWATCH_TARGET_PROVIDER");
        return Ok(ExitCode::from(EXIT_USAGE));
    };

    let source = PageSource::from_config(config)?;
    let notifier = ConfiguredNotifier::from_config(config)?;
    let ctx = CycleContext::from_config(config, target, notifier);
    let interval = Duration::from_secs(config.poll_interval_secs);

    tracing::info!(
        target,
        interval_secs = config.poll_interval_secs,
        state_file = %config.state_file.display(),
        notifier = ctx.notifier.kind(),
        mode = %config.fetch_mode,
        "starting monitor"
    );

    // Signal handlers are installed before the first cycle starts.
    let shutdown = tokio::spawn(shutdown_signal());
    let cycles = run_until(&source, &ctx, interval, shutdown, |fetched| {
        if output_json {
            write_export(config, fetched);
        }
    })
    .await;

    tracing::info!(cycles, "monitor stopped");
    Ok(ExitCode::SUCCESS)
}

/// Runs cycles every `interval` until `shutdown` finishes and returns how many
/// ran. A started cycle always runs to its state save; shutdown is only
/// observed between cycles.
pub(crate) async fn run_until<S, N>(
    source: &S,
    ctx: &CycleContext<N>,
    interval: Duration,
    mut shutdown: JoinHandle<()>,
    mut after_fetch: impl FnMut(&FetchResult),
) -> u64
where
    S: SlotSource,
    N: Notifier,
{
    let mut cycles = 0;
    loop {
        let fetched = fetch_for_cycle(source).await;
        after_fetch(&fetched);
        let report = run_cycle(ctx, &fetched, Utc::now()).await;
        cycles += 1;
        tracing::debug!(outcome = %report.outcome, cycles, "monitor cycle finished");

        if shutdown.is_finished() {
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }
    cycles
}
