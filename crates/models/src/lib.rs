//! Shared data model for the validator monitoring daemon: the fault
//! taxonomy, per-tick validator snapshots, the durable per-subscription
//! alert state, and configuration types.

mod alert;
mod config;
mod stats;
mod validator;

pub use alert::{AlertKind, AlertLevel, AlertNotification, Fault, ValidatorAlertState};
pub use config::{
    AlertConfig, Config, NotificationsConfig, TelegramConfig, ValidatorsMonitorConfig,
    DEFAULT_NOTIFY_EVERY,
};
pub use stats::{SubscriptionStatus, ValidatorStats};
pub use validator::Validator;
