pub mod log_entry;
pub mod purchase;
pub mod queue_item;
pub mod server_plan;
pub mod settings;
pub mod sniper_task;
pub mod stats;
pub mod subscription;

pub use log_entry::{LogEntry, LogLevel};
pub use purchase::{PurchaseRecord, PurchaseStatus};
pub use queue_item::{QueueItem, QueueStatus, MAX_RETRY_INTERVAL_SECS, MIN_RETRY_INTERVAL_SECS};
pub use server_plan::{ConfigOption, DatacenterStatus, ServerPlan};
pub use settings::Settings;
pub use sniper_task::{BoundConfig, MatchStatus, SniperMode, SniperTask};
pub use stats::Stats;
pub use subscription::{AvailabilityChange, ChangeType, Subscription};
