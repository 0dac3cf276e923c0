use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, FetchMode};
use crate::ConfigError;

const DEFAULT_URL: &str = "https://www.centromed.cl/reserva-de-horas/";
const DEFAULT_USER_AGENT: &str = "slotwatch/0.1 (+appointment-monitor)";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can feed a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        parse_value::<u32>(var, &or_default(var, default))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        parse_value::<u64>(var, &or_default(var, default))
    };

    let url = or_default("SLOTWATCH_URL", DEFAULT_URL);
    let search_name = or_default("SLOTWATCH_SEARCH_NAME", "Alvarez");
    let prevision = or_default("SLOTWATCH_PREVISION", "FONASA");
    let target_provider = optional("SLOTWATCH_TARGET_PROVIDER");

    let horizon_days = parse_u32("SLOTWATCH_HORIZON_DAYS", "30")?;
    let fetch_timeout_secs = parse_u64("SLOTWATCH_FETCH_TIMEOUT_SECS", "30")?;
    let nav_attempts = parse_u32("SLOTWATCH_NAV_ATTEMPTS", "3")?;
    require_positive("SLOTWATCH_NAV_ATTEMPTS", nav_attempts)?;
    let retry_backoff_base_ms = parse_u64("SLOTWATCH_RETRY_BACKOFF_BASE_MS", "1000")?;
    let poll_interval_secs = parse_u64("SLOTWATCH_POLL_INTERVAL_SECS", "300")?;
    let failure_threshold = parse_u32("SLOTWATCH_FAILURE_THRESHOLD", "3")?;
    require_positive("SLOTWATCH_FAILURE_THRESHOLD", failure_threshold)?;
    let pause_duration_hours = parse_u32("SLOTWATCH_PAUSE_DURATION_HOURS", "24")?;

    let artifacts_dir = PathBuf::from(or_default("SLOTWATCH_ARTIFACTS_DIR", "./artifacts"));
    let state_file = optional("SLOTWATCH_STATE_FILE")
        .map_or_else(|| artifacts_dir.join("state.json"), PathBuf::from);

    let headless = parse_bool(
        "SLOTWATCH_HEADLESS",
        &or_default("SLOTWATCH_HEADLESS", "true"),
    )?;
    let fetch_mode = if headless {
        FetchMode::Headless
    } else {
        FetchMode::Interactive
    };

    let user_agent = or_default("SLOTWATCH_USER_AGENT", DEFAULT_USER_AGENT);
    let webhook_url = optional("SLOTWATCH_WEBHOOK_URL");
    let log_level = or_default("SLOTWATCH_LOG_LEVEL", "info");

    Ok(AppConfig {
        url,
        search_name,
        prevision,
        target_provider,
        horizon_days,
        fetch_timeout_secs,
        nav_attempts,
        retry_backoff_base_ms,
        poll_interval_secs,
        failure_threshold,
        pause_duration_hours,
        artifacts_dir,
        state_file,
        fetch_mode,
        user_agent,
        webhook_url,
        log_level,
    })
}

fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

fn require_positive(var: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no` (any case).
fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
