//! Foreground attribution
//!
//! Providers answer "which applications were used recently"; the scheduler
//! polls them on two cadences and hands snapshots to the session monitor.

mod command;
mod provider;
mod scheduler;

pub use command::{parse_client_list, CommandProvider, DEFAULT_MAX_ENTRIES};
pub use provider::{AttributionProvider, AttributionSnapshot, StaticProvider};
pub use scheduler::{AttributionScheduler, SchedulerConfig, SchedulerStats};
