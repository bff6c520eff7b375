use std::collections::BTreeSet;

use models::{
    AlertConfig, AlertKind, AlertLevel, AlertNotification, Fault, ValidatorAlertState,
    ValidatorStats, ValidatorsMonitorConfig,
};

/// Fold one tick's observations for a single (validator, subscriber) pair
/// into the subscriber's durable alert state.
///
/// Faults whose kind the subscriber's configuration suppresses are invisible
/// here, on appearance and clearance alike. Active faults are re-alerted on
/// the subscription's `notify_every` cadence; a fault absent this tick whose
/// counter is non-zero produces a cleared edge, subject to the RPC gate.
///
/// Returns `None` when there is nothing to tell the subscriber.
pub fn evaluate(
    stats: &ValidatorStats,
    faults: &[Fault],
    state: &mut ValidatorAlertState,
    alert_config: &AlertConfig,
    config: &ValidatorsMonitorConfig,
) -> Option<AlertNotification> {
    let mut notification = AlertNotification::default();
    let mut seen: BTreeSet<AlertKind> = BTreeSet::new();

    let notify_every = state.validator.notify_every.max(1);
    let prev_missed = state.recent_missed_blocks_counter;

    for fault in faults {
        if !fault.active(alert_config) {
            continue;
        }
        let kind = fault.kind();
        seen.insert(kind);

        match fault {
            Fault::MissedRecentBlocks { .. } => {
                let count = state.alert_type_counts.entry(kind).or_insert(0);
                let on_cadence = *count % notify_every == 0;
                *count += 1;

                let missed = stats.recent_missed_blocks;
                let level = if missed > prev_missed
                    && missed > config.recent_missed_blocks_notify_threshold
                {
                    AlertLevel::High
                } else {
                    AlertLevel::Warning
                };
                // Alert on the cadence, and additionally at every change in
                // the miss count.
                if on_cadence || missed != prev_missed {
                    notification.alerts.push(fault.to_string());
                    notification.raise_level(level);
                }
                state.recent_missed_blocks_counter = missed;
                state.recent_missed_blocks_counter_max =
                    state.recent_missed_blocks_counter_max.max(missed);
            }
            Fault::SlashingSla { .. } => {
                // The slashing window is thousands of blocks, so one outage
                // keeps this fault present for hours. Alert only on the first
                // occurrence of a breach episode.
                let count = state.alert_type_counts.entry(kind).or_insert(0);
                if *count == 0 {
                    *count += 1;
                    notification.alerts.push(fault.to_string());
                    notification.raise_level(AlertLevel::High);
                }
            }
            _ => {
                let level = match kind {
                    AlertKind::Tombstoned => AlertLevel::Critical,
                    AlertKind::Jailed | AlertKind::ChainHalt => AlertLevel::High,
                    _ => AlertLevel::Warning,
                };
                let count = state.alert_type_counts.entry(kind).or_insert(0);
                if *count % notify_every == 0 {
                    notification.alerts.push(fault.to_string());
                    notification.raise_level(level);
                }
                *count += 1;
            }
        }
    }

    let rpc_fault_present =
        seen.contains(&AlertKind::OutOfSync) || seen.contains(&AlertKind::GenericRpc);

    for kind in AlertKind::all().iter().copied() {
        if seen.contains(&kind) || state.count(kind) == 0 {
            continue;
        }
        if !alert_config.alert_active(kind) {
            // The kind was gated off while active. It behaves as never
            // observed: drop the counter without a clearing edge.
            state.alert_type_counts.insert(kind, 0);
            continue;
        }
        // While an RPC-class fault is present the silence about non-RPC kinds
        // proves nothing. Defer their clears, counters intact.
        if !kind.is_rpc() && rpc_fault_present {
            continue;
        }
        state.alert_type_counts.insert(kind, 0);
        match kind {
            AlertKind::Jailed => {
                notification.cleared_alerts.push("jailed".to_string());
                notification.notify_for_clear = true;
            }
            AlertKind::Tombstoned => {
                notification.cleared_alerts.push("tombstoned".to_string());
                notification.notify_for_clear = true;
            }
            AlertKind::OutOfSync => {
                notification
                    .cleared_alerts
                    .push("rpc server out of sync".to_string());
            }
            AlertKind::GenericRpc => {
                notification.cleared_alerts.push("generic rpc error".to_string());
            }
            AlertKind::BlockFetch => {
                notification
                    .cleared_alerts
                    .push("rpc block fetch error".to_string());
            }
            AlertKind::MissedRecentBlocks => {
                notification
                    .cleared_alerts
                    .push("missed recent blocks".to_string());
                if state.recent_missed_blocks_counter_max
                    > config.recent_missed_blocks_notify_threshold
                {
                    notification.notify_for_clear = true;
                }
                state.recent_missed_blocks_counter = 0;
                state.recent_missed_blocks_counter_max = 0;
            }
            AlertKind::SlashingSla => {
                notification
                    .cleared_alerts
                    .push("slashing sla uptime recovered".to_string());
                notification.notify_for_clear = true;
            }
            // A resolved halt needs no message of its own.
            AlertKind::ChainHalt => {}
        }
    }

    if notification.alerts.is_empty() && notification.cleared_alerts.is_empty() {
        return None;
    }
    Some(notification)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, Utc};
    use models::Validator;

    fn config() -> ValidatorsMonitorConfig {
        ValidatorsMonitorConfig::default()
    }

    fn subscriber(notify_every: i64) -> ValidatorAlertState {
        let mut validator = Validator::new("primary", "celestiavalcons1qqqq");
        validator.notify_every = notify_every;
        ValidatorAlertState::new(validator)
    }

    fn healthy_stats() -> ValidatorStats {
        let mut stats = ValidatorStats::new(Utc::now(), 100);
        stats.last_signed_block_height = 100;
        stats.slashing_period_uptime = 99.9;
        stats
    }

    fn missed_stats(missed: i64) -> ValidatorStats {
        let mut stats = healthy_stats();
        stats.recent_missed_blocks = missed;
        stats.last_signed_block_height = 100 - missed;
        stats
    }

    #[test]
    fn healthy_tick_yields_nothing() {
        let mut state = subscriber(20);
        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        );
        assert_eq!(result, None);
        assert!(state.alert_type_counts.values().all(|c| *c == 0));
    }

    #[test]
    fn first_jail_alerts_at_high() {
        let until = Utc::now() + Duration::hours(1);
        let mut state = subscriber(20);

        let result = evaluate(
            &healthy_stats(),
            &[Fault::Jailed { until }],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.alerts.len(), 1);
        assert!(result.alerts[0].contains("jailed until"));
        assert_eq!(result.alert_level, AlertLevel::High);
        assert!(result.cleared_alerts.is_empty());
        assert_eq!(state.count(AlertKind::Jailed), 1);
    }

    #[test]
    fn continued_jail_is_debounced() {
        let until = Utc::now() + Duration::hours(1);
        let faults = [Fault::Jailed { until }];
        let mut state = subscriber(20);

        evaluate(&healthy_stats(), &faults, &mut state, &AlertConfig::default(), &config())
            .unwrap();
        let second =
            evaluate(&healthy_stats(), &faults, &mut state, &AlertConfig::default(), &config());

        assert_eq!(second, None);
        assert_eq!(state.count(AlertKind::Jailed), 2);
    }

    #[test]
    fn debounce_realerts_on_cadence() {
        let until = Utc::now() + Duration::hours(1);
        let faults = [Fault::Jailed { until }];
        let mut state = subscriber(3);

        let mut alert_ticks = Vec::new();
        for tick in 0..7 {
            let result = evaluate(
                &healthy_stats(),
                &faults,
                &mut state,
                &AlertConfig::default(),
                &config(),
            );
            if result.is_some() {
                alert_ticks.push(tick);
            }
        }
        assert_eq!(alert_ticks, vec![0, 3, 6]);
        assert_eq!(state.count(AlertKind::Jailed), 7);
    }

    #[test]
    fn jail_clear_pings_and_resets() {
        let until = Utc::now() + Duration::hours(1);
        let mut state = subscriber(20);
        for _ in 0..3 {
            evaluate(
                &healthy_stats(),
                &[Fault::Jailed { until }],
                &mut state,
                &AlertConfig::default(),
                &config(),
            );
        }

        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert!(result.alerts.is_empty());
        assert_eq!(result.cleared_alerts, vec!["jailed".to_string()]);
        assert!(result.notify_for_clear);
        assert_eq!(state.count(AlertKind::Jailed), 0);
    }

    #[test]
    fn tombstoned_is_critical() {
        let mut state = subscriber(20);
        let result = evaluate(
            &healthy_stats(),
            &[Fault::Tombstoned],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();
        assert_eq!(result.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn missed_blocks_escalate_on_growth() {
        let mut state = subscriber(20);
        let alert_config = AlertConfig::default();
        let config = config();

        // Tick 1: 5 missed. Fresh counter, so it alerts, below the notify
        // threshold, so Warning.
        let stats = missed_stats(5);
        let faults = [Fault::MissedRecentBlocks { missed: 5, window: 20 }];
        let result = evaluate(&stats, &faults, &mut state, &alert_config, &config).unwrap();
        assert_eq!(result.alert_level, AlertLevel::Warning);
        assert_eq!(state.recent_missed_blocks_counter, 5);

        // Tick 2: grown to 12, above the threshold. Off-cadence but the count
        // changed, so it alerts at High.
        let stats = missed_stats(12);
        let faults = [Fault::MissedRecentBlocks { missed: 12, window: 20 }];
        let result = evaluate(&stats, &faults, &mut state, &alert_config, &config).unwrap();
        assert_eq!(result.alert_level, AlertLevel::High);
        assert_eq!(state.recent_missed_blocks_counter, 12);
        assert_eq!(state.recent_missed_blocks_counter_max, 12);

        // Tick 3: unchanged at 12 and off-cadence. Silent.
        let result = evaluate(&stats, &faults, &mut state, &alert_config, &config);
        assert_eq!(result, None);
        assert_eq!(state.count(AlertKind::MissedRecentBlocks), 3);
    }

    #[test]
    fn missed_blocks_shrinking_alerts_at_warning() {
        let mut state = subscriber(20);
        state.recent_missed_blocks_counter = 12;
        state.recent_missed_blocks_counter_max = 12;
        state.alert_type_counts.insert(AlertKind::MissedRecentBlocks, 2);

        let stats = missed_stats(4);
        let faults = [Fault::MissedRecentBlocks { missed: 4, window: 20 }];
        let result =
            evaluate(&stats, &faults, &mut state, &AlertConfig::default(), &config()).unwrap();

        assert_eq!(result.alert_level, AlertLevel::Warning);
        assert_eq!(state.recent_missed_blocks_counter, 4);
        // The peak is retained until the clearing edge.
        assert_eq!(state.recent_missed_blocks_counter_max, 12);
    }

    #[test]
    fn missed_blocks_clear_resets_counters() {
        let mut state = subscriber(20);
        state.recent_missed_blocks_counter = 12;
        state.recent_missed_blocks_counter_max = 12;
        state.alert_type_counts.insert(AlertKind::MissedRecentBlocks, 5);

        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.cleared_alerts, vec!["missed recent blocks".to_string()]);
        // Peak exceeded the notify threshold, so the recovery pings.
        assert!(result.notify_for_clear);
        assert_eq!(state.recent_missed_blocks_counter, 0);
        assert_eq!(state.recent_missed_blocks_counter_max, 0);
    }

    #[test]
    fn small_missed_blocks_clear_is_silent() {
        let mut state = subscriber(20);
        state.recent_missed_blocks_counter = 3;
        state.recent_missed_blocks_counter_max = 3;
        state.alert_type_counts.insert(AlertKind::MissedRecentBlocks, 2);

        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.cleared_alerts, vec!["missed recent blocks".to_string()]);
        assert!(!result.notify_for_clear);
    }

    #[test]
    fn slashing_sla_fires_once_per_episode() {
        let fault = [Fault::SlashingSla { uptime: 97.0, threshold: 98.0 }];
        let mut state = subscriber(20);
        let alert_config = AlertConfig::default();
        let config = config();

        let first =
            evaluate(&healthy_stats(), &fault, &mut state, &alert_config, &config).unwrap();
        assert_eq!(first.alerts.len(), 1);
        assert_eq!(first.alert_level, AlertLevel::High);
        assert_eq!(state.count(AlertKind::SlashingSla), 1);

        // The breach persists for many ticks without another alert, and the
        // counter stays pinned at one.
        for _ in 0..30 {
            let repeat = evaluate(&healthy_stats(), &fault, &mut state, &alert_config, &config);
            assert_eq!(repeat, None);
        }
        assert_eq!(state.count(AlertKind::SlashingSla), 1);

        let cleared =
            evaluate(&healthy_stats(), &[], &mut state, &alert_config, &config).unwrap();
        assert_eq!(cleared.cleared_alerts, vec!["slashing sla uptime recovered".to_string()]);
        assert!(cleared.notify_for_clear);
        assert_eq!(state.count(AlertKind::SlashingSla), 0);
    }

    #[test]
    fn rpc_fault_defers_non_rpc_clears() {
        let mut state = subscriber(20);
        state.alert_type_counts.insert(AlertKind::Jailed, 3);

        // The jail fault vanished, but only because the RPC view is broken.
        let result = evaluate(
            &healthy_stats(),
            &[Fault::OutOfSync { rpc: "https://rpc.example.com".into() }],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.alerts.len(), 1);
        assert!(result.cleared_alerts.is_empty());
        // Deferred clear keeps the counter.
        assert_eq!(state.count(AlertKind::Jailed), 3);
        assert_eq!(state.count(AlertKind::OutOfSync), 1);

        // Next tick the view recovers and both kinds clear together.
        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();
        assert!(result.cleared_alerts.contains(&"jailed".to_string()));
        assert!(result.cleared_alerts.contains(&"rpc server out of sync".to_string()));
        assert!(result.notify_for_clear);
        assert_eq!(state.count(AlertKind::Jailed), 0);
        assert_eq!(state.count(AlertKind::OutOfSync), 0);
    }

    #[test]
    fn rpc_kinds_clear_even_while_gated() {
        let mut state = subscriber(20);
        state.alert_type_counts.insert(AlertKind::GenericRpc, 2);

        // Out-of-sync is present, but the generic RPC error went away. The
        // RPC class clears regardless of the gate.
        let result = evaluate(
            &healthy_stats(),
            &[Fault::OutOfSync { rpc: "rpc".into() }],
            &mut state,
            &AlertConfig::default(),
            &config(),
        )
        .unwrap();

        assert!(result.cleared_alerts.contains(&"generic rpc error".to_string()));
        assert_eq!(state.count(AlertKind::GenericRpc), 0);
    }

    #[test]
    fn chain_halt_clears_silently() {
        let mut state = subscriber(20);
        state.alert_type_counts.insert(AlertKind::ChainHalt, 4);

        let result = evaluate(
            &healthy_stats(),
            &[],
            &mut state,
            &AlertConfig::default(),
            &config(),
        );

        // The counter resets but nothing is worth telling the subscriber.
        assert_eq!(result, None);
        assert_eq!(state.count(AlertKind::ChainHalt), 0);
    }

    #[test]
    fn ignored_kind_is_invisible() {
        let alert_config = AlertConfig { ignore_alerts: vec![AlertKind::Jailed] };
        let until = Utc::now() + Duration::hours(1);
        let mut state = subscriber(20);

        let result = evaluate(
            &healthy_stats(),
            &[Fault::Jailed { until }],
            &mut state,
            &alert_config,
            &config(),
        );
        assert_eq!(result, None);
        assert_eq!(state.count(AlertKind::Jailed), 0);
    }

    #[test]
    fn ignored_kind_never_produces_clear() {
        // The kind was gated off while its counter was non-zero.
        let alert_config = AlertConfig { ignore_alerts: vec![AlertKind::Jailed] };
        let mut state = subscriber(20);
        state.alert_type_counts.insert(AlertKind::Jailed, 2);

        let result = evaluate(&healthy_stats(), &[], &mut state, &alert_config, &config());

        assert_eq!(result, None);
        assert_eq!(state.count(AlertKind::Jailed), 0);
    }

    #[test]
    fn counters_grow_monotonically_until_clear() {
        let until = Utc::now() + Duration::hours(1);
        let mut state = subscriber(5);
        let mut previous = 0;
        for _ in 0..12 {
            evaluate(
                &healthy_stats(),
                &[Fault::Jailed { until }],
                &mut state,
                &AlertConfig::default(),
                &config(),
            );
            let count = state.count(AlertKind::Jailed);
            assert!(count > previous);
            previous = count;
        }
        evaluate(&healthy_stats(), &[], &mut state, &AlertConfig::default(), &config());
        assert_eq!(state.count(AlertKind::Jailed), 0);
    }
}
