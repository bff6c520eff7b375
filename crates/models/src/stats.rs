use chrono::{DateTime, Utc};

use crate::alert::{AlertLevel, Fault};
use crate::validator::Validator;

/// Per-tick snapshot of one validator's signing health, assembled by the
/// observation collector and annotated by the aggregator. Subscribers of the
/// same address share the snapshot read-only; per-user state lives in
/// [`crate::ValidatorAlertState`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorStats {
    /// Time of the RPC node's latest block.
    pub timestamp: DateTime<Utc>,
    /// The RPC node's latest block height.
    pub height: i64,
    /// Blocks missed inside the recent-blocks window.
    pub recent_missed_blocks: i64,
    /// Height of the most recent block the validator signed, `-1` if unknown.
    pub last_signed_block_height: i64,
    pub last_signed_block_timestamp: Option<DateTime<Utc>>,
    /// Percent of the slashing window's blocks that were signed.
    pub slashing_period_uptime: f64,
    pub recent_missed_block_alert_level: AlertLevel,
    /// Overall level per the aggregation rules.
    pub alert_level: AlertLevel,
    /// Whether this snapshot was assembled through a broken RPC view.
    pub rpc_error: bool,
    pub tombstoned: bool,
    pub jailed_until: Option<DateTime<Utc>>,
    /// Active faults observed this tick.
    pub faults: Vec<Fault>,
}

impl ValidatorStats {
    pub fn new(timestamp: DateTime<Utc>, height: i64) -> ValidatorStats {
        ValidatorStats {
            timestamp,
            height,
            recent_missed_blocks: 0,
            last_signed_block_height: -1,
            last_signed_block_timestamp: None,
            slashing_period_uptime: 0.0,
            recent_missed_block_alert_level: AlertLevel::None,
            alert_level: AlertLevel::None,
            rpc_error: false,
            tombstoned: false,
            jailed_until: None,
            faults: Vec::new(),
        }
    }

    /// Raise the overall level, never lowering it.
    pub fn raise_alert_level(&mut self, level: AlertLevel) {
        if self.alert_level < level {
            self.alert_level = level;
        }
    }
}

/// A subscription joined with the latest published snapshot for its address.
/// `stats` is absent until the first tick after startup has completed.
#[derive(Debug, Clone)]
pub struct SubscriptionStatus {
    pub validator: Validator,
    pub stats: Option<ValidatorStats>,
}
