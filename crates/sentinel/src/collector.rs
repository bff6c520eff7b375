//! Observation collector: assembles one validator's [`ValidatorStats`]
//! snapshot from one chain-client round.
//!
//! Transient RPC trouble is hidden from the alerting state machine by the
//! retry gate: while an attempt produced nothing but `GenericRpc` faults, the
//! whole observation is retried with exponential backoff, up to the
//! configured budget. Any non-RPC fault is real information and returns
//! immediately.

use std::time::Duration;

use chain_client::{ChainClient, SlashingParams, Status};
use chrono::Utc;
use models::{Fault, ValidatorStats, ValidatorsMonitorConfig};

use crate::address::decode_consensus_address;

pub struct Collector<'a, C> {
    client: &'a C,
    config: &'a ValidatorsMonitorConfig,
}

impl<'a, C: ChainClient> Collector<'a, C> {
    pub fn new(client: &'a C, config: &'a ValidatorsMonitorConfig) -> Collector<'a, C> {
        Collector { client, config }
    }

    /// Observe one validator. `params` and `status` are fetched once per tick
    /// and shared across validators. Never fails: fault conditions, including
    /// exhausted RPC retries, are returned inside the snapshot.
    pub async fn collect(
        &self,
        address: &str,
        params: &SlashingParams,
        status: &Status,
    ) -> ValidatorStats {
        let raw = match decode_consensus_address(address) {
            Ok(raw) => raw,
            Err(err) => {
                // Deterministic, not worth the retry budget. Addresses are
                // validated on subscription, so this means corrupt state.
                let mut stats = self.fresh_stats(status);
                stats.faults.push(Fault::GenericRpc { msg: format!("{err:#}") });
                return stats;
            }
        };

        let retries = self.config.rpc_retries.max(1);
        let mut attempt = 0;
        loop {
            let stats = self.attempt(address, &raw, params, status).await;

            let transient_only = !stats.faults.is_empty()
                && stats.faults.iter().all(|f| matches!(f, Fault::GenericRpc { .. }));
            if !transient_only || attempt + 1 >= retries {
                return stats;
            }

            let backoff = Duration::from_secs((attempt * attempt + 1) as u64);
            tracing::debug!(%address, attempt, backoff_s = backoff.as_secs(), "transient rpc faults, retrying observation");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn fresh_stats(&self, status: &Status) -> ValidatorStats {
        ValidatorStats::new(
            status.sync_info.latest_block_time,
            status.sync_info.latest_block_height,
        )
    }

    async fn attempt(
        &self,
        address: &str,
        raw: &[u8],
        params: &SlashingParams,
        status: &Status,
    ) -> ValidatorStats {
        let mut stats = self.fresh_stats(status);

        let info = match self.client.signing_info(address).await {
            Ok(info) => info,
            Err(err) => {
                stats.faults.push(Fault::GenericRpc {
                    msg: format!("error fetching signing info for {address}: {err}"),
                });
                return stats;
            }
        };

        stats.tombstoned = info.tombstoned;
        if info.tombstoned {
            stats.faults.push(Fault::Tombstoned);
        }
        stats.jailed_until = info.jailed_until;
        let now = Utc::now();
        if let Some(until) = info.jailed_until {
            if until > now {
                stats.faults.push(Fault::Jailed { until });
            }
        }

        let window = params.signed_blocks_window.max(1);
        stats.slashing_period_uptime =
            100.0 - 100.0 * (info.missed_blocks_counter as f64 / window as f64);

        if status.sync_info.catching_up {
            stats.faults.push(Fault::OutOfSync { rpc: self.config.rpc.clone() });
        } else {
            let behind = now
                .signed_duration_since(status.sync_info.latest_block_time)
                .num_nanoseconds()
                .unwrap_or(i64::MAX);
            if behind > self.config.halt_threshold_nanoseconds {
                stats.faults.push(Fault::ChainHalt { duration_ns: behind });
            }
        }

        // Walk the recent window, newest first. Height 1 has no usable
        // commit and is never visited.
        let mut height = stats.height;
        while height > stats.height - self.config.recent_blocks_to_check && height > 1 {
            let block = match self.client.block(height).await {
                Ok(block) => block,
                Err(err) => {
                    // Subject to the retry gate, like any other transport
                    // failure during assembly.
                    stats.faults.push(Fault::GenericRpc {
                        msg: format!("error fetching block {height}: {err}"),
                    });
                    return stats;
                }
            };
            if block.signed_by(raw) {
                if block.header.height > stats.last_signed_block_height {
                    stats.last_signed_block_height = block.header.height;
                    stats.last_signed_block_timestamp = Some(block.header.time);
                }
            } else {
                stats.recent_missed_blocks += 1;
            }
            height -= 1;
        }

        if stats.recent_missed_blocks > self.config.missed_blocks_threshold {
            stats.faults.push(Fault::MissedRecentBlocks {
                missed: stats.recent_missed_blocks,
                window: self.config.recent_blocks_to_check,
            });

            if stats.last_signed_block_height == -1 {
                self.find_last_signed_block(&mut stats, raw).await;
            }
        }

        stats
    }

    /// Walk backwards past the recent window, at most one slashing period
    /// deep, looking for the validator's last signed block.
    async fn find_last_signed_block(&self, stats: &mut ValidatorStats, raw: &[u8]) {
        let floor = (stats.height - self.config.slashing_period).max(1);
        let mut height = stats.height - self.config.recent_blocks_to_check;
        while height > floor && stats.last_signed_block_height == -1 {
            let block = match self.client.block(height).await {
                Ok(block) => block,
                Err(err) => {
                    tracing::debug!(height, %err, "aborting last-signed-block search");
                    stats.faults.push(Fault::BlockFetch {
                        height,
                        rpc: self.config.rpc.clone(),
                    });
                    return;
                }
            };
            if block.signed_by(raw) {
                stats.last_signed_block_height = block.header.height;
                stats.last_signed_block_timestamp = Some(block.header.time);
            }
            height -= 1;
        }
    }
}
