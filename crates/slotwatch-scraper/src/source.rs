//! Slot sources: where a monitoring cycle gets its slots from.

use std::future::Future;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use slotwatch_core::{AppConfig, FetchMode, SlotRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::artifacts::{self, NAV_FAILURE_PREFIX, SUBMIT_FAILURE_PREFIX};
use crate::client::{PageClient, SearchForm};
use crate::error::ScraperError;
use crate::extract::extract_slots;
use crate::row::parse_rows;

/// Lowercase markers of a challenge widget.
const CAPTCHA_MARKERS: &[&str] = &["g-recaptcha", "h-captcha", "cf-turnstile", "captcha"];

/// Lowercase texts the site shows when a search legitimately finds nothing.
const NO_OPENINGS_MARKERS: &[&str] = &["no hay horas", "no existen horas", "sin horas disponibles"];

static RESULTS_CONTAINER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(table|tbody)\b").expect("valid regex"));
// The search form submits through an invisible reCAPTCHA button and loads
// its script on every page, so neither marks a challenge.
static FORM_CAPTCHA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<button\b[^>]*>").expect("valid regex")
});

/// Slots found by one fetch plus the failure signal for the decision engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub slots: Vec<SlotRecord>,
    /// The submission was blocked by a challenge page.
    pub failure_detected: bool,
    pub url: String,
}

/// Anything that can produce a batch of slots for a cycle.
pub trait SlotSource {
    fn fetch(&self) -> impl Future<Output = Result<FetchResult, ScraperError>> + Send;
}

/// Returns `true` when `html` is a challenge page rather than search results.
///
/// A page with a results table or a "no openings" message is never a
/// challenge. Otherwise a challenge widget must appear outside `<script>`
/// blocks and `<button>` tags.
#[must_use]
pub fn is_captcha_page(html: &str) -> bool {
    let lower = html.to_lowercase();
    if RESULTS_CONTAINER_RE.is_match(&lower)
        || NO_OPENINGS_MARKERS.iter().any(|marker| lower.contains(marker))
    {
        return false;
    }
    let outside_form = FORM_CAPTCHA_RE.replace_all(&lower, " ");
    CAPTCHA_MARKERS
        .iter()
        .any(|marker| outside_form.contains(marker))
}

/// Live source: loads the booking page and submits the doctor search.
pub struct PageSource {
    client: PageClient,
    form: SearchForm,
    artifacts_dir: PathBuf,
    mode: FetchMode,
}

impl PageSource {
    #[must_use]
    pub fn new(
        client: PageClient,
        form: SearchForm,
        artifacts_dir: PathBuf,
        mode: FetchMode,
    ) -> Self {
        Self {
            client,
            form,
            artifacts_dir,
            mode,
        }
    }

    /// Builds a page source from application config.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError`] if the configured URL is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let client = PageClient::new(
            &config.url,
            config.fetch_timeout_secs,
            &config.user_agent,
            config.nav_attempts,
            config.retry_backoff_base_ms,
        )?;
        let form = SearchForm {
            prevision: config.prevision.clone(),
            apellido: config.search_name.clone(),
        };
        Ok(Self::new(
            client,
            form,
            config.artifacts_dir.clone(),
            config.fetch_mode,
        ))
    }

    async fn load_results(&self) -> Result<String, ScraperError> {
        let result = match self.client.navigate().await {
            Ok(_) => self.client.submit_search(&self.form).await,
            Err(e) => Err(e),
        };
        result.inspect_err(|e| self.snapshot_navigation_failure(e))
    }

    fn snapshot_navigation_failure(&self, err: &ScraperError) {
        tracing::error!(url = %self.client.url(), error = %err, "booking page could not be loaded");
        let html = match err {
            ScraperError::UnexpectedStatus { body, .. } if !body.is_empty() => body.clone(),
            other => other.to_string(),
        };
        if let Err(e) =
            artifacts::save_snapshot(&self.artifacts_dir, NAV_FAILURE_PREFIX, &html, Utc::now())
        {
            tracing::warn!(error = %e, "failed to save navigation failure snapshot");
        }
    }

    fn snapshot_blocked_submission(&self, html: &str) {
        if let Err(e) =
            artifacts::save_snapshot(&self.artifacts_dir, SUBMIT_FAILURE_PREFIX, html, Utc::now())
        {
            tracing::warn!(error = %e, "failed to save submit failure snapshot");
        }
    }
}

impl SlotSource for PageSource {
    async fn fetch(&self) -> Result<FetchResult, ScraperError> {
        let mut html = self.load_results().await?;
        let mut rows = parse_rows(&html);

        if rows.is_empty() && is_captcha_page(&html) {
            tracing::warn!(
                url = %self.client.url(),
                mode = %self.mode,
                "search blocked by a challenge page"
            );
            self.snapshot_blocked_submission(&html);

            if self.mode == FetchMode::Interactive && prompt_operator().await {
                html = self.client.submit_search(&self.form).await?;
                rows = parse_rows(&html);
            }

            if rows.is_empty() && is_captcha_page(&html) {
                return Ok(FetchResult {
                    slots: Vec::new(),
                    failure_detected: true,
                    url: self.client.url().to_owned(),
                });
            }
        }

        let slots = extract_slots(&rows);
        tracing::info!(rows = rows.len(), slots = slots.len(), "fetched booking page");
        Ok(FetchResult {
            slots,
            failure_detected: false,
            url: self.client.url().to_owned(),
        })
    }
}

/// Asks the operator to clear the challenge. Returns `false` if stdin is
/// closed or unreadable.
async fn prompt_operator() -> bool {
    let mut stdout = tokio::io::stdout();
    let prompt =
        b"The booking site is showing a CAPTCHA. Solve it in a browser, then press Enter to retry... ";
    if stdout.write_all(prompt).await.is_err() || stdout.flush().await.is_err() {
        return false;
    }
    let mut line = String::new();
    match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "could not read operator confirmation");
            false
        }
    }
}

/// Replays the newest `slots_*.json` export in a directory.
pub struct ExportSource {
    dir: PathBuf,
}

impl ExportSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SlotSource for ExportSource {
    /// # Errors
    ///
    /// - [`ScraperError::NoExport`]: the directory holds no export.
    /// - [`ScraperError::Io`] / [`ScraperError::ExportParse`]: the newest
    ///   export cannot be read.
    async fn fetch(&self) -> Result<FetchResult, ScraperError> {
        let Some((path, modified)) = artifacts::find_latest_export(&self.dir)? else {
            return Err(ScraperError::NoExport {
                dir: self.dir.clone(),
            });
        };
        let export = artifacts::read_slots_export(&path)?;
        let failure_detected =
            export.failure_detected || artifacts::submit_failure_since(&self.dir, modified)?;
        tracing::info!(
            path = %path.display(),
            slots = export.slots.len(),
            failure_detected,
            "loaded slots export"
        );
        Ok(FetchResult {
            slots: export.slots,
            failure_detected,
            url: export.url,
        })
    }
}
