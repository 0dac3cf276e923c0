//! Temporal matching: picks the nearest slot for a provider within a horizon.
//!
//! Slot times are local wall-clock times as printed by the booking site, so
//! comparisons are made against local naive time.

use chrono::{Duration, Local, NaiveDateTime};
use slotwatch_core::SlotRecord;

/// Page timestamp format, e.g. `15/06/2025 09:00`.
pub const SLOT_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Parses a page timestamp. Returns `None` for anything that does not match
/// [`SLOT_TIME_FORMAT`] exactly.
#[must_use]
pub fn parse_slot_time(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), SLOT_TIME_FORMAT).ok()
}

/// Nearest slot for `target_provider` in `(now, now + horizon_days]`, using
/// the current local time.
#[must_use]
pub fn find_next_slot<'a>(
    slots: &'a [SlotRecord],
    target_provider: &str,
    horizon_days: u32,
) -> Option<&'a SlotRecord> {
    find_next_slot_at(
        slots,
        target_provider,
        horizon_days,
        Local::now().naive_local(),
    )
}

/// Like [`find_next_slot`] with an explicit `now`.
///
/// A slot qualifies when `target_provider` is a case-insensitive substring of
/// its provider and its time parses. Ties keep the first slot in input order.
#[must_use]
pub fn find_next_slot_at<'a>(
    slots: &'a [SlotRecord],
    target_provider: &str,
    horizon_days: u32,
    now: NaiveDateTime,
) -> Option<&'a SlotRecord> {
    if horizon_days == 0 {
        return None;
    }
    let cutoff = now + Duration::days(i64::from(horizon_days));
    let target = target_provider.to_lowercase();

    let mut best: Option<(NaiveDateTime, &SlotRecord)> = None;
    for slot in slots {
        if !slot.provider.to_lowercase().contains(&target) {
            continue;
        }
        let Some(instant) = slot.time_text().and_then(parse_slot_time) else {
            continue;
        };
        if instant <= now || instant > cutoff {
            continue;
        }
        if best.is_none_or(|(current, _)| instant < current) {
            best = Some((instant, slot));
        }
    }
    best.map(|(_, slot)| slot)
}
