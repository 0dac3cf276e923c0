//! Persisted per-provider monitor state.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::slot::SlotRecord;

/// The whole state file: one entry per provider ever monitored.
pub type StateMap = BTreeMap<String, MonitorState>;

/// What the monitor remembers about one target provider between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    /// Raw time string of the last slot that initialized state or notified.
    #[serde(rename = "hora", default)]
    pub last_hora: Option<String>,

    /// The full slot behind `last_hora`, kept for debugging.
    #[serde(default)]
    pub raw: Option<SlotRecord>,

    #[serde(default)]
    pub consecutive_failures: u32,

    #[serde(default)]
    pub paused: bool,

    /// Instant after which a pause clears itself. `None` while paused means
    /// the provider stays paused until someone edits the state file.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub paused_until: Option<DateTime<Utc>>,
}

impl MonitorState {
    /// The stored slot time, ignoring blank strings.
    #[must_use]
    pub fn last_hora(&self) -> Option<&str> {
        self.last_hora.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Accepts RFC 3339, a naive ISO timestamp (read as UTC), `null`, or garbage.
///
/// Garbage becomes `None` with a warning so one bad field cannot wipe the
/// rest of the state file.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(naive.and_utc()));
    }

    tracing::warn!(value = %raw, "unparseable paused_until; treating pause as open-ended");
    Ok(None)
}
