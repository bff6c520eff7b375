//! Persistence of user subscriptions, keyed by user id and validator
//! address. The on-disk layout is a single key/value table: the key is the
//! little-endian u64 user id followed by the ASCII bech32 address, the value
//! is the JSON-encoded subscription.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use models::Validator;
use rusqlite::{params, Connection};

/// Contract between the registry and the backing store. Object safe so the
/// registry can hold any implementation.
pub trait SubscriptionStore: Send + Sync {
    fn add(&self, user_id: i64, validator: &Validator) -> anyhow::Result<()>;
    fn remove(&self, user_id: i64, address: &str) -> anyhow::Result<()>;
    fn list(&self) -> anyhow::Result<BTreeMap<i64, Vec<Validator>>>;
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Store> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening subscription store {}", path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                key   BLOB PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("creating subscriptions table")?;
        Ok(Store { conn: Mutex::new(conn) })
    }
}

fn subscription_key(user_id: i64, address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + address.len());
    key.extend_from_slice(&(user_id as u64).to_le_bytes());
    key.extend_from_slice(address.as_bytes());
    key
}

fn split_key(key: &[u8]) -> anyhow::Result<(i64, &str)> {
    let (user, address) = key
        .split_first_chunk::<8>()
        .with_context(|| format!("corrupt subscription key {}", hex::encode(key)))?;
    let address = std::str::from_utf8(address)
        .with_context(|| format!("corrupt subscription key {}", hex::encode(key)))?;
    Ok((u64::from_le_bytes(*user) as i64, address))
}

impl SubscriptionStore for Store {
    fn add(&self, user_id: i64, validator: &Validator) -> anyhow::Result<()> {
        let key = subscription_key(user_id, &validator.address);
        let value = serde_json::to_string(validator).context("encoding subscription")?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO subscriptions (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .context("persisting subscription")?;
        Ok(())
    }

    fn remove(&self, user_id: i64, address: &str) -> anyhow::Result<()> {
        let key = subscription_key(user_id, address);
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM subscriptions WHERE key = ?1", params![key])
            .context("removing subscription")?;
        Ok(())
    }

    fn list(&self) -> anyhow::Result<BTreeMap<i64, Vec<Validator>>> {
        let conn = self.conn.lock().unwrap();
        let mut statement = conn
            .prepare("SELECT key, value FROM subscriptions ORDER BY key")
            .context("reading subscriptions")?;
        let mut rows = statement.query([]).context("reading subscriptions")?;

        let mut result: BTreeMap<i64, Vec<Validator>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            let value: String = row.get(1)?;
            let (user_id, _address) = split_key(&key)?;
            let validator: Validator = serde_json::from_str(&value)
                .with_context(|| format!("corrupt subscription value for key {}", hex::encode(&key)))?;
            result.entry(user_id).or_default().push(validator);
        }
        Ok(result)
    }
}
