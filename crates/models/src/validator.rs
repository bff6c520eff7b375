use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_NOTIFY_EVERY;

/// One user subscription: a monitored validator, identified by its bech32
/// consensus address. This is the record persisted to the subscription store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub name: String,
    pub address: String,
    /// Debounce cadence in ticks: while a fault stays active, it is re-alerted
    /// every `notify_every` ticks.
    pub notify_every: i64,
}

impl Validator {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Validator {
        Validator {
            name: name.into(),
            address: address.into(),
            notify_every: DEFAULT_NOTIFY_EVERY,
        }
    }
}
