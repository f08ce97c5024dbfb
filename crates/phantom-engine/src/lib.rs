pub mod catalog;
pub mod logs;
pub mod monitor;
pub mod notify;
pub mod purchase;
pub mod queue;
pub mod sniper;
pub mod state;

pub use logs::LogStore;
pub use monitor::Monitor;
pub use notify::Notifier;
pub use state::{PlanCache, SharedState};

/// Current time as epoch seconds.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
