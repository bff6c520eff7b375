use std::path::PathBuf;

use serde::Deserialize;

use crate::alert::AlertKind;

pub const DEFAULT_NOTIFY_EVERY: i64 = 20;

/// Top-level daemon configuration, deserialized from the YAML file passed to
/// the `monitor` subcommand.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    pub validators_monitor: ValidatorsMonitorConfig,
    /// Where the subscription store lives on disk.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Per-kind suppression of alerts. A suppressed kind is filtered out before
/// the state machine sees it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub ignore_alerts: Vec<AlertKind>,
}

impl AlertConfig {
    pub fn alert_active(&self, kind: AlertKind) -> bool {
        !self.ignore_alerts.contains(&kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorsMonitorConfig {
    /// Tendermint RPC endpoint to monitor through.
    pub rpc: String,
    pub chain_id: String,
    /// Bech32 human-readable prefix of consensus addresses on this chain.
    #[serde(default = "default_bech32_prefix")]
    pub bech32_prefix: String,
    /// Observation attempts per tick while only transient RPC faults are seen.
    #[serde(default = "default_rpc_retries")]
    pub rpc_retries: usize,
    /// Default debounce cadence applied to new subscriptions.
    #[serde(default = "default_notify_every")]
    pub notify_every: i64,
    #[serde(default = "default_slashing_warn_threshold")]
    pub slashing_warn_threshold: f64,
    #[serde(default = "default_slashing_error_threshold")]
    pub slashing_error_threshold: f64,
    /// Window of most recent blocks whose signatures are checked every tick.
    #[serde(default = "default_recent_blocks_to_check")]
    pub recent_blocks_to_check: i64,
    /// Minimum misses in the window before a missed-blocks fault is raised.
    #[serde(default = "default_missed_blocks_threshold")]
    pub missed_blocks_threshold: i64,
    /// Miss count at which a missed-blocks alert escalates to High.
    #[serde(default = "default_recent_missed_blocks_notify_threshold")]
    pub recent_missed_blocks_notify_threshold: i64,
    /// Length of the chain's slashing window, in blocks. Bounds the backward
    /// search for the last signed block.
    #[serde(default = "default_slashing_period")]
    pub slashing_period: i64,
    /// How long without a new block before the chain is considered halted.
    #[serde(default = "default_halt_threshold_nanoseconds")]
    pub halt_threshold_nanoseconds: i64,
    /// Bound on concurrent per-validator observations within one tick.
    #[serde(
        default = "default_max_concurrent_checks",
        alias = "max_nb_concurrent_goroutines"
    )]
    pub max_concurrent_checks: usize,
}

impl Default for ValidatorsMonitorConfig {
    fn default() -> ValidatorsMonitorConfig {
        ValidatorsMonitorConfig {
            rpc: String::new(),
            chain_id: String::new(),
            bech32_prefix: default_bech32_prefix(),
            rpc_retries: default_rpc_retries(),
            notify_every: default_notify_every(),
            slashing_warn_threshold: default_slashing_warn_threshold(),
            slashing_error_threshold: default_slashing_error_threshold(),
            recent_blocks_to_check: default_recent_blocks_to_check(),
            missed_blocks_threshold: default_missed_blocks_threshold(),
            recent_missed_blocks_notify_threshold: default_recent_missed_blocks_notify_threshold(),
            slashing_period: default_slashing_period(),
            halt_threshold_nanoseconds: default_halt_threshold_nanoseconds(),
            max_concurrent_checks: default_max_concurrent_checks(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./sentinel.db")
}

fn default_bech32_prefix() -> String {
    "celestiavalcons".to_string()
}

fn default_rpc_retries() -> usize {
    3
}

fn default_notify_every() -> i64 {
    DEFAULT_NOTIFY_EVERY
}

// 20 of the last 10,000 blocks missed.
fn default_slashing_warn_threshold() -> f64 {
    99.80
}

// 200 of the last 10,000 blocks missed.
fn default_slashing_error_threshold() -> f64 {
    98.0
}

fn default_recent_blocks_to_check() -> i64 {
    20
}

fn default_missed_blocks_threshold() -> i64 {
    1
}

fn default_recent_missed_blocks_notify_threshold() -> i64 {
    10
}

fn default_slashing_period() -> i64 {
    10_000
}

// Five minutes without a block is considered a halt.
fn default_halt_threshold_nanoseconds() -> i64 {
    300_000_000_000
}

fn default_max_concurrent_checks() -> usize {
    10
}
