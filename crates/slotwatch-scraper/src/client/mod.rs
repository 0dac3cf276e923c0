//! HTTP client for the booking page.

use std::time::Duration;

use reqwest::Client;

use crate::error::ScraperError;
use crate::rate_limit::retry_with_backoff;

/// Response bodies kept on errors are truncated to this many bytes.
const MAX_ERROR_BODY_BYTES: usize = 256 * 1024;

/// Fields posted when searching by doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    /// Health-insurance option label, e.g. `"FONASA"`.
    pub prevision: String,
    /// Doctor last name typed into the search box.
    pub apellido: String,
}

impl SearchForm {
    fn as_pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("prevision", self.prevision.as_str()),
            ("apellido", self.apellido.as_str()),
        ]
    }
}

/// Loads the booking page and submits the doctor search.
///
/// Every request is bounded by the configured timeout and retried on
/// transient failures up to `nav_attempts` attempts in total.
pub struct PageClient {
    client: Client,
    url: String,
    nav_attempts: u32,
    backoff_base_ms: u64,
}

impl PageClient {
    /// Creates a client for `url` with a per-request timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if `url` is not an absolute
    /// http(s) URL, or [`ScraperError::Http`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        url: &str,
        timeout_secs: u64,
        user_agent: &str,
        nav_attempts: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ScraperError> {
        Self::validate_url(url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
            nav_attempts,
            backoff_base_ms,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Loads the booking page.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Http`]: network failure after all attempts.
    /// - [`ScraperError::RateLimited`]: HTTP 429 after all attempts.
    /// - [`ScraperError::UnexpectedStatus`]: 5xx after all attempts, or any 4xx.
    pub async fn navigate(&self) -> Result<String, ScraperError> {
        retry_with_backoff(self.nav_attempts, self.backoff_base_ms, |attempt| {
            tracing::debug!(url = %self.url, attempt, "loading booking page");
            let request = self
                .client
                .get(&self.url)
                .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml");
            self.read_page(request)
        })
        .await
    }

    /// Submits the doctor search and returns the results page.
    ///
    /// # Errors
    ///
    /// Same as [`Self::navigate`].
    pub async fn submit_search(&self, form: &SearchForm) -> Result<String, ScraperError> {
        retry_with_backoff(self.nav_attempts, self.backoff_base_ms, |attempt| {
            tracing::debug!(
                url = %self.url,
                attempt,
                apellido = %form.apellido,
                "submitting search"
            );
            let request = self
                .client
                .post(&self.url)
                .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
                .header(reqwest::header::REFERER, &self.url)
                .form(&form.as_pairs());
            self.read_page(request)
        })
        .await
    }

    async fn read_page(&self, request: reqwest::RequestBuilder) -> Result<String, ScraperError> {
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ScraperError::RateLimited {
                url: self.url.clone(),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY_BYTES);
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.url.clone(),
                body,
            });
        }

        Ok(response.text().await?)
    }

    fn validate_url(url: &str) -> Result<(), ScraperError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| ScraperError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScraperError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("unsupported scheme \"{}\"", parsed.scheme()),
            });
        }
        Ok(())
    }
}

fn truncate_at_char_boundary(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
