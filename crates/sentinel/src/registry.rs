//! In-memory subscription registry: who watches which validator, the per
//! subscription alert state, and the latest published snapshots.
//!
//! All subscription state lives behind one mutex, held briefly around
//! mutations and for the duration of the per-subscriber dispatch loop. The
//! published snapshot map has its own lock so interactive `list`/`status`
//! queries do not contend with a running tick.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::{bail, Context};
use models::{
    AlertNotification, Config, SubscriptionStatus, Validator, ValidatorAlertState, ValidatorStats,
};

use crate::address::validate_address;
use crate::alerts::evaluate;
use crate::store::SubscriptionStore;

pub struct Registry {
    state: Mutex<State>,
    stats: Mutex<HashMap<String, ValidatorStats>>,
    store: Box<dyn SubscriptionStore>,
    config: Config,
}

/// Subscription state. `alert_state` owns the per-(address, user) records;
/// `user_index` mirrors the key set per user and is kept in lockstep.
#[derive(Default)]
struct State {
    alert_state: HashMap<String, HashMap<i64, ValidatorAlertState>>,
    user_index: HashMap<i64, BTreeSet<String>>,
}

impl Registry {
    pub fn new(store: Box<dyn SubscriptionStore>, config: Config) -> Registry {
        Registry {
            state: Mutex::new(State::default()),
            stats: Mutex::new(HashMap::new()),
            store,
            config,
        }
    }

    /// Replay the persisted subscriptions into memory. Called once at
    /// startup, before the first tick.
    pub fn load_subscriptions(&self) -> anyhow::Result<()> {
        let persisted = self.store.list().context("listing persisted subscriptions")?;
        let mut count = 0usize;
        for (user_id, validators) in persisted {
            for validator in validators {
                let address = validator.address.clone();
                self.insert(user_id, validator).with_context(|| {
                    format!("loading subscription user={user_id} address={address}")
                })?;
                count += 1;
            }
        }
        tracing::info!(subscriptions = count, "loaded subscription registry");
        Ok(())
    }

    /// Validate and insert in memory only.
    fn insert(&self, user_id: i64, mut validator: Validator) -> anyhow::Result<()> {
        validate_address(&validator.address, &self.config.validators_monitor.bech32_prefix)?;
        if validator.notify_every <= 0 {
            validator.notify_every = self.config.validators_monitor.notify_every;
        }

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let users = state.alert_state.entry(validator.address.clone()).or_default();
        if users.contains_key(&user_id) {
            bail!("already registered");
        }
        let address = validator.address.clone();
        users.insert(user_id, ValidatorAlertState::new(validator));
        state.user_index.entry(user_id).or_default().insert(address);
        Ok(())
    }

    fn forget(&self, user_id: i64, address: &str) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(users) = state.alert_state.get_mut(address) {
            users.remove(&user_id);
            if users.is_empty() {
                state.alert_state.remove(address);
            }
        }
        if let Some(addresses) = state.user_index.get_mut(&user_id) {
            addresses.remove(address);
            if addresses.is_empty() {
                state.user_index.remove(&user_id);
            }
        }
    }

    /// Subscribe `user_id` to a validator and persist the subscription. The
    /// in-memory insert is rolled back if persistence fails.
    pub fn add(&self, user_id: i64, mut validator: Validator) -> anyhow::Result<()> {
        if validator.notify_every <= 0 {
            validator.notify_every = self.config.validators_monitor.notify_every;
        }
        let address = validator.address.clone();
        self.insert(user_id, validator.clone())?;

        if let Err(err) = self.store.add(user_id, &validator) {
            self.forget(user_id, &address);
            return Err(err.context("persisting subscription"));
        }
        tracing::debug!(user_id, %address, "added validator subscription");
        Ok(())
    }

    /// Drop a subscription. Errors when the user is not subscribed to
    /// `address`.
    pub fn remove(&self, user_id: i64, address: &str) -> anyhow::Result<()> {
        {
            let state = self.state.lock().unwrap();
            let subscribed = state
                .user_index
                .get(&user_id)
                .is_some_and(|addresses| addresses.contains(address));
            if !subscribed {
                bail!("not found");
            }
        }
        self.store
            .remove(user_id, address)
            .context("removing persisted subscription")?;
        self.forget(user_id, address);
        tracing::debug!(user_id, %address, "removed validator subscription");
        Ok(())
    }

    /// All of one user's subscriptions joined with the latest snapshots.
    pub fn list(&self, user_id: i64) -> Vec<SubscriptionStatus> {
        let state = self.state.lock().unwrap();
        let stats = self.stats.lock().unwrap();

        let Some(addresses) = state.user_index.get(&user_id) else {
            return Vec::new();
        };
        addresses
            .iter()
            .filter_map(|address| {
                let users = state.alert_state.get(address)?;
                let alert_state = users.get(&user_id)?;
                Some(SubscriptionStatus {
                    validator: alert_state.validator.clone(),
                    stats: stats.get(address).cloned(),
                })
            })
            .collect()
    }

    /// One subscription joined with its latest snapshot.
    pub fn status(&self, user_id: i64, address: &str) -> anyhow::Result<SubscriptionStatus> {
        let state = self.state.lock().unwrap();
        let stats = self.stats.lock().unwrap();

        let alert_state = state
            .alert_state
            .get(address)
            .and_then(|users| users.get(&user_id));
        let Some(alert_state) = alert_state else {
            bail!("validator not registered for user: {address}");
        };
        Ok(SubscriptionStatus {
            validator: alert_state.validator.clone(),
            stats: stats.get(address).cloned(),
        })
    }

    /// The distinct addresses to observe this tick.
    pub fn addresses(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.alert_state.keys().cloned().collect()
    }

    /// Atomically replace the published snapshot map.
    pub fn publish(&self, stats: HashMap<String, ValidatorStats>) {
        *self.stats.lock().unwrap() = stats;
    }

    /// Run the alert state machine for every subscriber of every snapshot,
    /// returning the notifications to deliver. Holds the registry lock for
    /// the whole dispatch pass; the snapshots are shared read-only.
    pub fn dispatch(
        &self,
        published: &HashMap<String, ValidatorStats>,
    ) -> Vec<(i64, Validator, ValidatorStats, AlertNotification)> {
        let mut state = self.state.lock().unwrap();
        let mut notifications = Vec::new();

        for (address, stats) in published {
            let Some(users) = state.alert_state.get_mut(address) else {
                continue;
            };
            for (user_id, alert_state) in users.iter_mut() {
                let notification = evaluate(
                    stats,
                    &stats.faults,
                    alert_state,
                    &self.config.alerts,
                    &self.config.validators_monitor,
                );
                if let Some(notification) = notification {
                    notifications.push((
                        *user_id,
                        alert_state.validator.clone(),
                        stats.clone(),
                        notification,
                    ));
                }
            }
        }
        notifications
    }

    #[cfg(test)]
    fn assert_bijection(&self) {
        let state = self.state.lock().unwrap();
        for (address, users) in &state.alert_state {
            assert!(!users.is_empty());
            for user_id in users.keys() {
                assert!(state.user_index[user_id].contains(address));
            }
        }
        for (user_id, addresses) in &state.user_index {
            assert!(!addresses.is_empty());
            for address in addresses {
                assert!(state.alert_state[address].contains_key(user_id));
            }
        }
    }
}
