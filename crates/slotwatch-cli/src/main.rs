mod check;
mod ci;
mod monitor;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use slotwatch_core::{AppConfig, FetchMode};
use slotwatch_monitor::{ConfiguredNotifier, Notifier};
use tracing_subscriber::EnvFilter;

/// Exit status for usage and input errors.
pub(crate) const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "slotwatch")]
#[command(about = "Watch a booking site for earlier appointment slots")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Keep checking every interval and notify on earlier slots
    #[arg(long)]
    monitor: bool,

    /// With the one-shot check, also send the status when slots are found
    #[arg(long, conflicts_with = "monitor")]
    notify: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one decision cycle from the latest slots export in the artifacts directory
    Ci,
    /// Send a test message through the configured notifier
    NotifyTest {
        #[arg(long, default_value = "slotwatch test notification")]
        message: String,
    },
}

/// Flags that override environment configuration.
#[derive(Debug, Args)]
struct Overrides {
    /// Provider whose next slot is tracked (case-insensitive substring)
    #[arg(long, global = true, visible_alias = "target-doctor")]
    target_provider: Option<String>,

    /// Only consider slots within this many days
    #[arg(long, global = true)]
    max_days: Option<u32>,

    /// Last name typed into the site's search box
    #[arg(long, global = true, visible_alias = "doctor")]
    search_name: Option<String>,

    /// Health-insurance option selected in the search form
    #[arg(long, global = true)]
    prevision: Option<String>,

    /// Prompt for help when the site shows a CAPTCHA
    #[arg(long, global = true)]
    interactive: bool,

    /// Save found slots to `slots_<ts>.json` in the artifacts directory
    #[arg(long, global = true)]
    output_json: bool,

    /// Seconds between checks in monitor mode
    #[arg(long, global = true)]
    interval_seconds: Option<u64>,

    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Artifacts directory (snapshots, exports, default state file)
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(target) = self.target_provider.as_deref().map(str::trim) {
            config.target_provider = (!target.is_empty()).then(|| target.to_owned());
        }
        if let Some(days) = self.max_days {
            config.horizon_days = days;
        }
        if let Some(name) = &self.search_name {
            config.search_name.clone_from(name);
        }
        if let Some(prevision) = &self.prevision {
            config.prevision.clone_from(prevision);
        }
        if self.interactive {
            config.fetch_mode = FetchMode::Interactive;
        }
        if let Some(secs) = self.interval_seconds {
            config.poll_interval_secs = secs;
        }
        if let Some(artifacts) = &self.artifacts {
            // A state file derived from the old artifacts dir follows the new one.
            if config.state_file == config.artifacts_dir.join("state.json") {
                config.state_file = artifacts.join("state.json");
            }
            config.artifacts_dir.clone_from(artifacts);
        }
        if let Some(state_file) = &self.state_file {
            config.state_file.clone_from(state_file);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match slotwatch_core::load_app_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    cli.overrides.apply(&mut config);

    if let Err(e) = init_tracing(&config) {
        eprintln!("Error: invalid log filter: {e}");
        return ExitCode::from(EXIT_USAGE);
    }
    tracing::debug!(?config, "configuration loaded");

    let result = match cli.command {
        Some(Commands::Ci) => ci::run(&config).await,
        Some(Commands::NotifyTest { message }) => notify_test(&config, &message).await,
        None if cli.monitor => monitor::run(&config, cli.overrides.output_json).await,
        None => check::run(&config, cli.overrides.output_json, cli.notify).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "slotwatch failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn notify_test(config: &AppConfig, message: &str) -> anyhow::Result<ExitCode> {
    let notifier = ConfiguredNotifier::from_config(config)?;
    notifier.send(message).await?;
    println!("Test notification sent via {} notifier.", notifier.kind());
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping");
}
