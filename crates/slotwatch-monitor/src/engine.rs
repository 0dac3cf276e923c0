//! The monitoring state machine.
//!
//! [`decide`] is pure: it takes the previous state of one provider plus what
//! this cycle observed and returns the next state, the notifications to send
//! and a summary of what happened. Persisting and sending are the caller's
//! job (see [`crate::cycle`]).

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use slotwatch_core::{AppConfig, MonitorState, SlotRecord};

use crate::matcher::parse_slot_time;

/// Failure/pause policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Consecutive failures that trigger a pause. Always at least 1.
    pub failure_threshold: u32,
    pub pause_duration: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            pause_duration: Duration::hours(24),
        }
    }
}

impl Policy {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            pause_duration: Duration::hours(i64::from(config.pause_duration_hours)),
        }
    }
}

/// What a cycle did for its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The provider is paused and the pause has not expired.
    StillPaused,
    /// Failures reached the threshold this cycle.
    PauseTriggered,
    /// First slot ever seen was stored without notifying.
    Initialized,
    /// A strictly earlier slot was found and announced.
    SlotFreed,
    Unchanged,
    /// Another run held the state lock; nothing was evaluated.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StillPaused => "still_paused",
            Self::PauseTriggered => "pause_triggered",
            Self::Initialized => "initialized",
            Self::SlotFreed => "slot_freed",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Result of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub state: MonitorState,
    /// Messages to send, in order. At most a resume notice followed by one
    /// pause alert or slot notice.
    pub notifications: Vec<String>,
    pub outcome: Outcome,
}

#[must_use]
pub fn resumed_message(provider: &str) -> String {
    format!("Monitor resumed for {provider}")
}

#[must_use]
pub fn paused_message(provider: &str, failures: u32, until: DateTime<Utc>) -> String {
    format!(
        "Monitor paused for {provider}: detected {failures} consecutive submit failures/CAPTCHA. \
         Paused until {}. Please check the site or increase backoff.",
        until.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

#[must_use]
pub fn slot_freed_message(provider: &str, new_hora: &str, previous: &str) -> String {
    format!("Slot freed for {provider}: {new_hora}. Previously: {previous}")
}

/// Advances one provider's state by one cycle.
///
/// `nearest` is the matcher's pick for this cycle and `failure_detected` the
/// fetch's failure signal. A fetch that errored should be passed as
/// `nearest = None, failure_detected = false`.
#[must_use]
pub fn decide(
    previous: &MonitorState,
    provider: &str,
    nearest: Option<&SlotRecord>,
    failure_detected: bool,
    now: DateTime<Utc>,
    policy: &Policy,
) -> Decision {
    let mut state = previous.clone();
    let mut notifications = Vec::new();

    if state.paused {
        match state.paused_until {
            Some(until) if until <= now => {
                tracing::info!(provider, paused_until = %until, "pause expired, resuming");
                state.paused = false;
                state.paused_until = None;
                state.consecutive_failures = 0;
                notifications.push(resumed_message(provider));
            }
            until => {
                tracing::info!(
                    provider,
                    paused_until = ?until.map(|u| u.to_rfc3339()),
                    "monitor paused, skipping cycle"
                );
                return Decision {
                    state,
                    notifications,
                    outcome: Outcome::StillPaused,
                };
            }
        }
    }

    if failure_detected {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        tracing::warn!(
            provider,
            consecutive_failures = state.consecutive_failures,
            threshold = policy.failure_threshold,
            "submission failure detected"
        );
        if state.consecutive_failures >= policy.failure_threshold {
            let until = now + policy.pause_duration;
            state.paused = true;
            state.paused_until = Some(until);
            notifications.push(paused_message(provider, state.consecutive_failures, until));
            return Decision {
                state,
                notifications,
                outcome: Outcome::PauseTriggered,
            };
        }
    } else {
        state.consecutive_failures = 0;
    }

    let outcome = compare_slot(&mut state, provider, nearest, &mut notifications);
    Decision {
        state,
        notifications,
        outcome,
    }
}

fn compare_slot(
    state: &mut MonitorState,
    provider: &str,
    nearest: Option<&SlotRecord>,
    notifications: &mut Vec<String>,
) -> Outcome {
    let Some((slot, new_hora)) = nearest.and_then(|s| s.time_text().map(|h| (s, h.to_owned())))
    else {
        return Outcome::Unchanged;
    };

    let Some(previous) = state.last_hora().map(str::to_owned) else {
        tracing::info!(provider, hora = %new_hora, "first observation, storing without notifying");
        accept(state, slot, new_hora);
        return Outcome::Initialized;
    };

    let Some(new_instant) = parse_slot_time(&new_hora) else {
        return Outcome::Unchanged;
    };
    let improved = parse_slot_time(&previous).is_none_or(|prev| new_instant < prev);
    if !improved {
        tracing::debug!(provider, found = %new_hora, saved = %previous, "no earlier slot");
        return Outcome::Unchanged;
    }

    tracing::info!(provider, found = %new_hora, saved = %previous, "earlier slot found");
    notifications.push(slot_freed_message(provider, &new_hora, &previous));
    accept(state, slot, new_hora);
    Outcome::SlotFreed
}

fn accept(state: &mut MonitorState, slot: &SlotRecord, hora: String) {
    state.last_hora = Some(hora);
    state.raw = Some(slot.clone());
    state.consecutive_failures = 0;
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
