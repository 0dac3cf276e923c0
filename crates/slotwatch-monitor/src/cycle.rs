//! One monitoring cycle: match, lock, load, decide, notify, save.
//!
//! Both the long-running monitor and the CI run go through [`run_cycle`];
//! they differ only in where the [`FetchResult`] comes from.

use chrono::{DateTime, Local, Utc};
use slotwatch_core::{AppConfig, SlotRecord};
use slotwatch_scraper::{FetchResult, SlotSource};

use crate::engine::{decide, Outcome, Policy};
use crate::matcher::find_next_slot_at;
use crate::notifier::{send_best_effort, Notifier};
use crate::store::StateStore;

/// Everything a cycle needs besides the fetched slots.
#[derive(Debug, Clone)]
pub struct CycleContext<N> {
    pub store: StateStore,
    pub notifier: N,
    pub target_provider: String,
    pub horizon_days: u32,
    pub policy: Policy,
}

impl<N: Notifier> CycleContext<N> {
    /// Builds a context for `target_provider` from config.
    #[must_use]
    pub fn from_config(config: &AppConfig, target_provider: &str, notifier: N) -> Self {
        Self {
            store: StateStore::new(&config.state_file),
            notifier,
            target_provider: target_provider.to_owned(),
            horizon_days: config.horizon_days,
            policy: Policy::from_config(config),
        }
    }
}

/// What [`run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: Outcome,
    /// The matcher's pick for this cycle, if any.
    pub nearest: Option<SlotRecord>,
    /// Notifications attempted, in order, whether or not delivery succeeded.
    pub notifications: Vec<String>,
}

/// Fetches from `source`, turning an error into an empty, failure-free result.
/// Fetch errors never count toward the pause threshold.
pub async fn fetch_for_cycle<S: SlotSource>(source: &S) -> FetchResult {
    match source.fetch().await {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::error!(error = %e, "fetch failed, treating as no slots");
            FetchResult::default()
        }
    }
}

/// Runs one decision cycle for the context's target provider.
///
/// If another run holds the state lock the cycle is skipped and nothing is
/// read, sent or written.
pub async fn run_cycle<N: Notifier>(
    ctx: &CycleContext<N>,
    fetched: &FetchResult,
    now: DateTime<Utc>,
) -> CycleReport {
    let local_now = now.with_timezone(&Local).naive_local();
    let nearest = find_next_slot_at(
        &fetched.slots,
        &ctx.target_provider,
        ctx.horizon_days,
        local_now,
    )
    .cloned();

    let _lock = match ctx.store.lock() {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!(error = %e, "skipping cycle, state is locked");
            return CycleReport {
                outcome: Outcome::Skipped,
                nearest,
                notifications: Vec::new(),
            };
        }
    };

    let mut state = ctx.store.load();
    let previous = state
        .get(&ctx.target_provider)
        .cloned()
        .unwrap_or_default();

    let decision = decide(
        &previous,
        &ctx.target_provider,
        nearest.as_ref(),
        fetched.failure_detected,
        now,
        &ctx.policy,
    );

    for message in &decision.notifications {
        send_best_effort(&ctx.notifier, message).await;
    }

    state.insert(ctx.target_provider.clone(), decision.state);
    ctx.store.save(&state);

    tracing::info!(
        provider = %ctx.target_provider,
        outcome = %decision.outcome,
        slots = fetched.slots.len(),
        nearest = nearest.as_ref().and_then(SlotRecord::time_text).unwrap_or("none"),
        "cycle complete"
    );

    CycleReport {
        outcome: decision.outcome,
        nearest,
        notifications: decision.notifications,
    }
}
