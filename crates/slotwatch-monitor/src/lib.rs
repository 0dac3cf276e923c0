pub mod cycle;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod notifier;
pub mod store;

pub use cycle::{fetch_for_cycle, run_cycle, CycleContext, CycleReport};
pub use engine::{decide, Decision, Outcome, Policy};
pub use error::{NotifyError, StoreError};
pub use matcher::{find_next_slot, find_next_slot_at, parse_slot_time};
pub use notifier::{send_best_effort, ConfiguredNotifier, LogNotifier, Notifier, WebhookNotifier};
pub use store::{StateLock, StateStore};
