//! Files written to and read from the artifacts directory.
//!
//! Layout:
//! - `{prefix}_page_{unix_ts}.html`: page snapshots (`submit_failure`,
//!   `nav_failure`).
//! - `slots_{unix_ts}.json`: slot exports consumed by the CI run, carrying
//!   the fetch's failure flag.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwatch_core::SlotRecord;

use crate::error::ScraperError;
use crate::source::FetchResult;

/// Snapshot prefix for a submission that hit a CAPTCHA wall.
pub const SUBMIT_FAILURE_PREFIX: &str = "submit_failure";
/// Snapshot prefix for a page that never loaded.
pub const NAV_FAILURE_PREFIX: &str = "nav_failure";

const EXPORT_PREFIX: &str = "slots_";
const EXPORT_SUFFIX: &str = ".json";

/// Contents of a `slots_*.json` export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsExport {
    /// Search name the export was produced for.
    #[serde(default)]
    pub doctor: String,
    #[serde(default)]
    pub slots: Vec<SlotRecord>,
    #[serde(default)]
    pub url: String,
    /// The fetch that produced this export was blocked by a challenge.
    #[serde(default)]
    pub failure_detected: bool,
}

impl SlotsExport {
    /// Export of one fetch, made for search name `doctor`.
    #[must_use]
    pub fn from_fetch(doctor: impl Into<String>, fetched: &FetchResult) -> Self {
        Self {
            doctor: doctor.into(),
            slots: fetched.slots.clone(),
            url: fetched.url.clone(),
            failure_detected: fetched.failure_detected,
        }
    }
}

/// Writes an HTML snapshot as `{prefix}_page_{unix_ts}.html`, creating the
/// directory if needed.
///
/// # Errors
///
/// Returns [`ScraperError::Io`] if the directory or file cannot be written.
pub fn save_snapshot(
    dir: &Path,
    prefix: &str,
    html: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf, ScraperError> {
    std::fs::create_dir_all(dir).map_err(|e| ScraperError::io(dir, e))?;
    let path = dir.join(format!("{prefix}_page_{}.html", now.timestamp()));
    std::fs::write(&path, html).map_err(|e| ScraperError::io(&path, e))?;
    tracing::info!(path = %path.display(), "saved page snapshot");
    Ok(path)
}

/// Writes `export` as pretty JSON to `slots_{unix_ts}.json`.
///
/// # Errors
///
/// Returns [`ScraperError::Io`] on write failure.
pub fn write_slots_export(
    dir: &Path,
    export: &SlotsExport,
    now: DateTime<Utc>,
) -> Result<PathBuf, ScraperError> {
    std::fs::create_dir_all(dir).map_err(|e| ScraperError::io(dir, e))?;
    let path = dir.join(format!("{EXPORT_PREFIX}{}{EXPORT_SUFFIX}", now.timestamp()));
    let json = serde_json::to_string_pretty(export).map_err(|source| ScraperError::ExportParse {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|e| ScraperError::io(&path, e))?;
    tracing::info!(path = %path.display(), slots = export.slots.len(), "wrote slots export");
    Ok(path)
}

/// Newest `slots_*.json` in `dir` by modification time, with that time.
///
/// A missing directory counts as "no export".
///
/// # Errors
///
/// Returns [`ScraperError::Io`] if the directory exists but cannot be listed.
pub fn find_latest_export(dir: &Path) -> Result<Option<(PathBuf, SystemTime)>, ScraperError> {
    Ok(list_artifacts(dir, |name| {
        name.starts_with(EXPORT_PREFIX) && name.ends_with(EXPORT_SUFFIX)
    })?
    .into_iter()
    .max_by_key(|(_, modified)| *modified))
}

/// Reads and parses a slots export.
///
/// # Errors
///
/// Returns [`ScraperError::Io`] if the file cannot be read, or
/// [`ScraperError::ExportParse`] if it is not a valid export.
pub fn read_slots_export(path: &Path) -> Result<SlotsExport, ScraperError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ScraperError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| ScraperError::ExportParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether a `submit_failure_*.html` snapshot was written after `since`.
///
/// # Errors
///
/// Returns [`ScraperError::Io`] if the directory exists but cannot be listed.
pub fn submit_failure_since(dir: &Path, since: SystemTime) -> Result<bool, ScraperError> {
    let prefix = format!("{SUBMIT_FAILURE_PREFIX}_");
    Ok(
        list_artifacts(dir, |name| name.starts_with(&prefix) && name.ends_with(".html"))?
            .iter()
            .any(|(_, modified)| *modified > since),
    )
}

fn list_artifacts(
    dir: &Path,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<(PathBuf, SystemTime)>, ScraperError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ScraperError::io(dir, e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScraperError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !keep(name) {
            continue;
        }
        match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => found.push((entry.path(), modified)),
            Err(e) => {
                tracing::debug!(file = name, error = %e, "skipping artifact without mtime");
            }
        }
    }
    Ok(found)
}
