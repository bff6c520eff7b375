use models::{AlertKind, AlertLevel, Fault, ValidatorStats, ValidatorsMonitorConfig};

/// Annotate a freshly collected snapshot: add faults that can only be judged
/// from the assembled snapshot, derive the RPC-health flags, and settle the
/// overall alert level. The level is only ever raised here.
pub fn aggregate(stats: &mut ValidatorStats, config: &ValidatorsMonitorConfig) {
    if stats.slashing_period_uptime < config.slashing_error_threshold {
        stats.faults.push(Fault::SlashingSla {
            uptime: stats.slashing_period_uptime,
            threshold: config.slashing_error_threshold,
        });
    }

    stats.rpc_error = stats.faults.iter().any(|fault| {
        matches!(
            fault.kind(),
            AlertKind::OutOfSync | AlertKind::GenericRpc | AlertKind::ChainHalt
        )
    });

    stats.recent_missed_block_alert_level =
        if stats.recent_missed_blocks > config.recent_missed_blocks_notify_threshold {
            AlertLevel::High
        } else if stats.recent_missed_blocks > 0 {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        };

    let level = if stats.height == stats.last_signed_block_height {
        if stats.recent_missed_blocks == 0 {
            if stats.slashing_period_uptime >= config.slashing_warn_threshold {
                // Signing the tip, nothing missed, uptime healthy.
                AlertLevel::None
            } else {
                // Currently signing but still recovering from downtime.
                AlertLevel::Warning
            }
        } else {
            AlertLevel::Warning
        }
    } else if stats.recent_missed_blocks < config.recent_blocks_to_check {
        if stats.slashing_period_uptime > config.slashing_error_threshold {
            AlertLevel::Warning
        } else {
            AlertLevel::High
        }
    } else {
        // Missed the entire recent window.
        AlertLevel::High
    };
    stats.raise_alert_level(level);
}
