use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AlertConfig;
use crate::validator::Validator;

/// Severity of an alert or of a validator's overall condition.
/// Levels are totally ordered: `None < Warning < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    None,
    Warning,
    High,
    Critical,
}

/// The closed set of fault kinds the alerting engine recognizes. This is the
/// key space of the per-subscription debounce counters, and the name space of
/// the `alerts.ignore_alerts` configuration list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Jailed,
    Tombstoned,
    OutOfSync,
    ChainHalt,
    BlockFetch,
    MissedRecentBlocks,
    SlashingSla,
    GenericRpc,
}

impl AlertKind {
    pub fn name(&self) -> &'static str {
        match self {
            AlertKind::Jailed => "jailed",
            AlertKind::Tombstoned => "tombstoned",
            AlertKind::OutOfSync => "out_of_sync",
            AlertKind::ChainHalt => "chain_halt",
            AlertKind::BlockFetch => "block_fetch",
            AlertKind::MissedRecentBlocks => "missed_recent_blocks",
            AlertKind::SlashingSla => "slashing_sla",
            AlertKind::GenericRpc => "generic_rpc",
        }
    }

    pub fn all() -> &'static [AlertKind] {
        &[
            AlertKind::Jailed,
            AlertKind::Tombstoned,
            AlertKind::OutOfSync,
            AlertKind::ChainHalt,
            AlertKind::BlockFetch,
            AlertKind::MissedRecentBlocks,
            AlertKind::SlashingSla,
            AlertKind::GenericRpc,
        ]
    }

    pub fn from_str(name: &str) -> Option<AlertKind> {
        AlertKind::all()
            .iter()
            .find(|kind| name.eq_ignore_ascii_case(kind.name()))
            .copied()
    }

    /// Whether this kind reports a broken RPC view rather than a validator
    /// condition. While an RPC-class fault is present, silence about non-RPC
    /// kinds cannot be trusted and their clearing edges are deferred.
    pub fn is_rpc(&self) -> bool {
        matches!(self, AlertKind::OutOfSync | AlertKind::GenericRpc)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observed fault condition. Each variant carries only the data needed to
/// render and compare it; rendering is a pure function of the arm.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Jailed { until: DateTime<Utc> },
    Tombstoned,
    OutOfSync { rpc: String },
    ChainHalt { duration_ns: i64 },
    BlockFetch { height: i64, rpc: String },
    MissedRecentBlocks { missed: i64, window: i64 },
    SlashingSla { uptime: f64, threshold: f64 },
    GenericRpc { msg: String },
}

impl Fault {
    pub fn kind(&self) -> AlertKind {
        match self {
            Fault::Jailed { .. } => AlertKind::Jailed,
            Fault::Tombstoned => AlertKind::Tombstoned,
            Fault::OutOfSync { .. } => AlertKind::OutOfSync,
            Fault::ChainHalt { .. } => AlertKind::ChainHalt,
            Fault::BlockFetch { .. } => AlertKind::BlockFetch,
            Fault::MissedRecentBlocks { .. } => AlertKind::MissedRecentBlocks,
            Fault::SlashingSla { .. } => AlertKind::SlashingSla,
            Fault::GenericRpc { .. } => AlertKind::GenericRpc,
        }
    }

    /// The configuration gate. A fault whose kind is suppressed behaves as if
    /// it was never observed, on appearance and on clearance alike.
    pub fn active(&self, config: &AlertConfig) -> bool {
        config.alert_active(self.kind())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Jailed { until } => write!(f, "validator is jailed until {until}"),
            Fault::Tombstoned => f.write_str("validator is tombstoned"),
            Fault::OutOfSync { rpc } => {
                write!(f, "rpc server {rpc} out of sync, cannot get up to date information")
            }
            Fault::ChainHalt { duration_ns } => {
                let minutes = (*duration_ns as f64 / 6e10).round() as i64;
                write!(f, "rpc node has been halted for {minutes}min")
            }
            Fault::BlockFetch { height, rpc } => {
                write!(f, "error fetching block {height} from rpc server {rpc}")
            }
            Fault::MissedRecentBlocks { missed, window } => {
                write!(f, "missed {missed}/{window} most recent blocks")
            }
            Fault::SlashingSla { uptime, threshold } => {
                write!(f, "block signing uptime ({uptime:.2}%) under SLA ({threshold:.2}%)")
            }
            Fault::GenericRpc { msg } => f.write_str(msg),
        }
    }
}

/// Durable-across-ticks memory for one (validator, subscriber) pair.
///
/// `alert_type_counts[kind]` is the consecutive-occurrence counter for that
/// kind; it is zero exactly when the kind is not active in the state
/// machine's view.
#[derive(Debug, Clone)]
pub struct ValidatorAlertState {
    /// The subscriber's own copy of the subscription, carrying its
    /// `notify_every` cadence.
    pub validator: Validator,
    pub alert_type_counts: BTreeMap<AlertKind, i64>,
    /// Last observed `recent_missed_blocks` value.
    pub recent_missed_blocks_counter: i64,
    /// Peak observed `recent_missed_blocks` since the last clearing edge.
    pub recent_missed_blocks_counter_max: i64,
}

impl ValidatorAlertState {
    pub fn new(validator: Validator) -> ValidatorAlertState {
        ValidatorAlertState {
            validator,
            alert_type_counts: BTreeMap::new(),
            recent_missed_blocks_counter: 0,
            recent_missed_blocks_counter_max: 0,
        }
    }

    pub fn count(&self, kind: AlertKind) -> i64 {
        self.alert_type_counts.get(&kind).copied().unwrap_or(0)
    }
}

/// What the state machine emits for one (validator, subscriber) evaluation:
/// newly raised alerts, cleared alerts, and the severity of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertNotification {
    pub alerts: Vec<String>,
    pub cleared_alerts: Vec<String>,
    /// Set when at least one cleared kind warrants a user-visible ping.
    pub notify_for_clear: bool,
    pub alert_level: AlertLevel,
}

impl AlertNotification {
    pub fn raise_level(&mut self, level: AlertLevel) {
        if self.alert_level < level {
            self.alert_level = level;
        }
    }
}
