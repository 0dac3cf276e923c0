//! The scraped appointment slot model.
//!
//! ## JSON shape
//!
//! Slots are exported and persisted as flat objects: the provider lives under
//! `doctor`, the page timestamp under `hora`, and every extra field captured
//! from the row (hidden form inputs, or `text`/`href` for unstructured rows)
//! sits next to them:
//!
//! ```json
//! {"doctor": "Dr. Juan Alvarez", "hora": "15/06/2025 09:00", "ID_AGENDA": "991"}
//! ```
//!
//! Fallback rows carry no `doctor`/`hora` keys at all. Hidden inputs without a
//! `value` attribute were historically exported as `null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extra-field keys consulted when a row has no structured time cell.
const TIME_FALLBACK_KEYS: [&str; 2] = ["HORA", "PROXIMA"];

/// One appointment entry as it appeared on the booking page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSlot")]
pub struct SlotRecord {
    /// Provider display name as extracted.
    #[serde(rename = "doctor", skip_serializing_if = "String::is_empty")]
    pub provider: String,

    /// Page timestamp in `DD/MM/YYYY HH:MM` form.
    #[serde(rename = "hora", skip_serializing_if = "String::is_empty")]
    pub time_raw: String,

    /// Additional named fields captured from the source row.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl SlotRecord {
    /// A structured record for `provider` at `time_raw` with no extra fields.
    pub fn new(provider: impl Into<String>, time_raw: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            time_raw: time_raw.into(),
            extra: BTreeMap::new(),
        }
    }

    /// A generic record for a row that did not have the structured shape.
    pub fn unstructured(text: impl Into<String>, href: impl Into<String>) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("text".to_string(), text.into());
        extra.insert("href".to_string(), href.into());
        Self {
            provider: String::new(),
            time_raw: String::new(),
            extra,
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The time string used for matching.
    ///
    /// `time_raw` wins when present; otherwise the hidden `HORA` and
    /// `PROXIMA` fields are tried in that order.
    #[must_use]
    pub fn time_text(&self) -> Option<&str> {
        if !self.time_raw.trim().is_empty() {
            return Some(self.time_raw.trim());
        }
        TIME_FALLBACK_KEYS
            .iter()
            .filter_map(|key| self.extra.get(*key))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    /// `true` when the record came from a structured row.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        !self.provider.is_empty() && !self.time_raw.is_empty()
    }
}

/// Lenient wire form: tolerates missing keys and non-string extras.
#[derive(Deserialize)]
struct RawSlot {
    #[serde(default)]
    doctor: Option<String>,
    #[serde(default)]
    hora: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl From<RawSlot> for SlotRecord {
    fn from(raw: RawSlot) -> Self {
        let extra = raw
            .rest
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Self {
            provider: raw.doctor.unwrap_or_default(),
            time_raw: raw.hora.unwrap_or_default(),
            extra,
        }
    }
}
