use std::path::PathBuf;

/// How the page source behaves when the booking site shows a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Unattended: a challenge is recorded as a failure and the cycle moves on.
    Headless,
    /// An operator is present and gets one chance to clear the challenge.
    Interactive,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Headless => write!(f, "headless"),
            FetchMode::Interactive => write!(f, "interactive"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub url: String,
    pub search_name: String,
    pub prevision: String,
    pub target_provider: Option<String>,
    pub horizon_days: u32,
    pub fetch_timeout_secs: u64,
    pub nav_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub poll_interval_secs: u64,
    pub failure_threshold: u32,
    pub pause_duration_hours: u32,
    pub artifacts_dir: PathBuf,
    pub state_file: PathBuf,
    pub fetch_mode: FetchMode,
    pub user_agent: String,
    pub webhook_url: Option<String>,
    pub log_level: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("url", &self.url)
            .field("search_name", &self.search_name)
            .field("prevision", &self.prevision)
            .field("target_provider", &self.target_provider)
            .field("horizon_days", &self.horizon_days)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("nav_attempts", &self.nav_attempts)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("failure_threshold", &self.failure_threshold)
            .field("pause_duration_hours", &self.pause_duration_hours)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("state_file", &self.state_file)
            .field("fetch_mode", &self.fetch_mode)
            .field("user_agent", &self.user_agent)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("log_level", &self.log_level)
            .finish()
    }
}
