//! The periodic driver. One task owns the tick: fetch the shared chain
//! state, fan observation out over the subscribed validators with bounded
//! concurrency, publish the snapshots, then dispatch notifications per
//! subscription. Ticks never overlap; deliveries are fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chain_client::ChainClient;
use chrono::Utc;
use futures::StreamExt;
use models::{Config, ValidatorStats};
use tokio::sync::watch;

use crate::alerts::aggregate;
use crate::collector::Collector;
use crate::notifier::Notifier;
use crate::registry::Registry;

const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct Monitor<C, N> {
    registry: Arc<Registry>,
    client: C,
    notifier: Arc<N>,
    config: Config,
}

impl<C: ChainClient, N: Notifier> Monitor<C, N> {
    pub fn new(registry: Arc<Registry>, client: C, notifier: Arc<N>, config: Config) -> Monitor<C, N> {
        Monitor { registry, client, notifier, config }
    }

    /// Run ticks until `shutdown` fires. The first tick runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(rpc = %self.config.validators_monitor.rpc, "starting validator monitoring");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("validator monitoring stopped");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }
            self.tick().await;
        }
    }

    /// One monitoring round. Per-validator trouble is carried inside the
    /// snapshots; only a broken shared view skips the round entirely.
    pub async fn tick(&self) {
        let started = std::time::Instant::now();
        let monitor_config = &self.config.validators_monitor;

        let params = match self.client.slashing_params().await {
            Ok(params) => params,
            Err(error) => {
                tracing::error!(%error, "error retrieving slashing params, skipping tick");
                return;
            }
        };
        let status = match self.client.status().await {
            Ok(status) => status,
            Err(error) => {
                tracing::error!(%error, "error retrieving node status, skipping tick");
                return;
            }
        };

        // Without a synced node there is no trustworthy view to alert from.
        if status.sync_info.catching_up {
            tracing::warn!("rpc node is catching up, skipping tick");
            return;
        }
        let behind_ns = Utc::now()
            .signed_duration_since(status.sync_info.latest_block_time)
            .num_nanoseconds()
            .unwrap_or(i64::MAX);
        if behind_ns > monitor_config.halt_threshold_nanoseconds {
            tracing::warn!(behind_ns, "no recent block from rpc node, skipping tick");
            return;
        }

        let addresses = self.registry.addresses();
        let collector = Collector::new(&self.client, monitor_config);
        let params_ref = &params;
        let status_ref = &status;
        let collector_ref = &collector;

        let collected: Vec<(String, ValidatorStats)> = futures::stream::iter(addresses)
            .map(|address| async move {
                tracing::debug!(%address, "checking validator");
                let mut stats = collector_ref.collect(&address, params_ref, status_ref).await;
                aggregate(&mut stats, &self.config.validators_monitor);
                (address, stats)
            })
            .buffer_unordered(monitor_config.max_concurrent_checks.max(1))
            .collect()
            .await;
        let published: HashMap<String, ValidatorStats> = collected.into_iter().collect();

        self.registry.publish(published.clone());

        for (user_id, validator, stats, notification) in self.registry.dispatch(&published) {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(error) = notifier
                    .send_alert(user_id, &validator, &stats, &notification)
                    .await
                {
                    tracing::error!(
                        user_id,
                        address = %validator.address,
                        %error,
                        "failed to deliver alert notification"
                    );
                }
            });
        }

        tracing::info!(
            validators = published.len(),
            height = status.sync_info.latest_block_height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tick complete"
        );
    }
}
