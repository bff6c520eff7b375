//! Rendering of chat messages for the monitoring daemon. Everything here is a
//! pure function from engine state to Telegram Markdown text; delivery lives
//! with the notifier.

use chrono::{DateTime, Utc};
use models::{AlertLevel, AlertNotification, SubscriptionStatus, Validator, ValidatorStats};

pub const ICON_GOOD: &str = "\u{1F7E2}"; // green circle
pub const ICON_WARNING: &str = "\u{1F7E1}"; // yellow circle
pub const ICON_ERROR: &str = "\u{1F534}"; // red circle

pub fn level_icon(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::None => ICON_GOOD,
        AlertLevel::Warning => ICON_WARNING,
        AlertLevel::High | AlertLevel::Critical => ICON_ERROR,
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%a %b %e %H:%M:%S %Y UTC").to_string()
}

fn uptime_label(stats: Option<&ValidatorStats>) -> String {
    match stats {
        Some(stats) if stats.slashing_period_uptime > 0.0 => {
            format!("{:.2}", stats.slashing_period_uptime)
        }
        _ => "N/A".to_string(),
    }
}

fn title(validator: &Validator, stats: Option<&ValidatorStats>) -> String {
    format!("{} `({}% up)`", validator.name, uptime_label(stats))
}

/// The message for newly raised alerts.
pub fn render_alerts(
    validator: &Validator,
    stats: &ValidatorStats,
    notification: &AlertNotification,
) -> String {
    let mut message = format!(
        "{} *{}*\n\nErrors:",
        level_icon(notification.alert_level),
        title(validator, Some(stats)),
    );
    for alert in &notification.alerts {
        message.push_str("\n\u{2022} ");
        message.push_str(alert);
    }
    message
}

/// The message for cleared alerts.
pub fn render_cleared(
    validator: &Validator,
    stats: &ValidatorStats,
    notification: &AlertNotification,
) -> String {
    let mut message = format!(
        "{ICON_GOOD} *{}*\n\nErrors cleared:",
        title(validator, Some(stats)),
    );
    for cleared in &notification.cleared_alerts {
        message.push_str("\n\u{2022} ");
        message.push_str(cleared);
    }
    message
}

/// The `/status` card for one subscription.
pub fn render_status(status: &SubscriptionStatus, recent_blocks_to_check: i64) -> String {
    let stats = status.stats.as_ref();
    let icon = level_icon(stats.map(|s| s.alert_level).unwrap_or(AlertLevel::None));
    let mut message = format!("{icon} *{}* {icon}\n", title(&status.validator, stats));

    let Some(stats) = stats else {
        message.push_str(&format!("{ICON_WARNING} Height *N/A* (no data yet)"));
        return message;
    };

    let rpc_icon = if stats.rpc_error { ICON_ERROR } else { ICON_GOOD };
    message.push_str(&format!(
        "{rpc_icon} Height *{}* - *{}*\n",
        stats.height,
        format_time(stats.timestamp)
    ));

    if stats.height != stats.last_signed_block_height {
        match stats.last_signed_block_timestamp {
            Some(signed_at) if stats.last_signed_block_height >= 0 => {
                message.push_str(&format!(
                    "{ICON_ERROR} Last Signed *{}* - *{}*\n",
                    stats.last_signed_block_height,
                    format_time(signed_at)
                ));
            }
            _ => message.push_str(&format!("{ICON_ERROR} Last Signed *N/A*\n")),
        }
    }

    if stats.rpc_error {
        message.push_str(&format!("{ICON_WARNING} Latest Blocks Signed: *N/A*"));
    } else {
        let signed_icon = match stats.recent_missed_block_alert_level {
            AlertLevel::None => ICON_GOOD,
            AlertLevel::Warning => ICON_WARNING,
            AlertLevel::High | AlertLevel::Critical => ICON_ERROR,
        };
        message.push_str(&format!(
            "{signed_icon} Latest Blocks Signed: *{}/{}*",
            recent_blocks_to_check - stats.recent_missed_blocks,
            recent_blocks_to_check
        ));
    }
    message
}

/// The `/list` summary over all of one user's subscriptions.
pub fn render_list(items: &[SubscriptionStatus]) -> String {
    let mut message = "*Validator Monitor List:*".to_string();
    for item in items {
        let icon = level_icon(
            item.stats
                .as_ref()
                .map(|s| s.alert_level)
                .unwrap_or(AlertLevel::None),
        );
        message.push_str(&format!(
            "\n  - {icon} *{}* {icon}",
            title(&item.validator, item.stats.as_ref())
        ));
    }
    message
}

pub fn help_text(bech32_prefix: &str) -> String {
    format!(
        "Validator monitoring commands:\n\
         \n\
         /add Name {bech32_prefix}1XXXXXXX\n\
         \u{2022} add a validator to your monitoring list\n\
         \n\
         /remove {bech32_prefix}1XXXXXXX\n\
         \u{2022} remove a validator from your monitoring list\n\
         \n\
         /list\n\
         \u{2022} list your monitored validators\n\
         \n\
         /status {bech32_prefix}1XXXXXXX\n\
         \u{2022} show the current state of one validator\n\
         \n\
         /help\n\
         \u{2022} show this message"
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn stats(height: i64, last_signed: i64, uptime: f64) -> ValidatorStats {
        let mut stats =
            ValidatorStats::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 40).unwrap(), height);
        stats.last_signed_block_height = last_signed;
        stats.last_signed_block_timestamp =
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 40).unwrap());
        stats.slashing_period_uptime = uptime;
        stats
    }

    #[test]
    fn alert_message_lists_errors() {
        let validator = Validator::new("primary", "celestiavalcons1qqqq");
        let notification = AlertNotification {
            alerts: vec!["validator is tombstoned".to_string()],
            alert_level: AlertLevel::Critical,
            ..Default::default()
        };
        let message = render_alerts(&validator, &stats(100, 100, 99.9), &notification);
        assert!(message.contains("*primary `(99.90% up)`*"));
        assert!(message.contains("Errors:\n\u{2022} validator is tombstoned"));
        assert!(message.starts_with(ICON_ERROR));
    }

    #[test]
    fn cleared_message_is_green() {
        let validator = Validator::new("primary", "celestiavalcons1qqqq");
        let notification = AlertNotification {
            cleared_alerts: vec!["jailed".to_string()],
            notify_for_clear: true,
            ..Default::default()
        };
        let message = render_cleared(&validator, &stats(100, 100, 99.9), &notification);
        assert!(message.starts_with(ICON_GOOD));
        assert!(message.contains("Errors cleared:\n\u{2022} jailed"));
    }

    #[test]
    fn status_card_for_healthy_validator() {
        let status = SubscriptionStatus {
            validator: Validator::new("primary", "celestiavalcons1qqqq"),
            stats: Some(stats(100, 100, 99.9)),
        };
        let card = render_status(&status, 20);
        assert!(card.contains("Height *100*"));
        assert!(card.contains("Latest Blocks Signed: *20/20*"));
        assert!(!card.contains("Last Signed"));
    }

    #[test]
    fn status_card_shows_last_signed_when_behind() {
        let mut behind = stats(100, 90, 99.0);
        behind.recent_missed_blocks = 10;
        behind.recent_missed_block_alert_level = AlertLevel::Warning;
        let status = SubscriptionStatus {
            validator: Validator::new("primary", "celestiavalcons1qqqq"),
            stats: Some(behind),
        };
        let card = render_status(&status, 20);
        assert!(card.contains("Last Signed *90*"));
        assert!(card.contains("Latest Blocks Signed: *10/20*"));
    }

    #[test]
    fn status_card_without_data() {
        let status = SubscriptionStatus {
            validator: Validator::new("primary", "celestiavalcons1qqqq"),
            stats: None,
        };
        let card = render_status(&status, 20);
        assert!(card.contains("`(N/A% up)`"));
        assert!(card.contains("no data yet"));
    }

    #[test]
    fn list_renders_every_subscription() {
        let items = vec![
            SubscriptionStatus {
                validator: Validator::new("a", "celestiavalcons1aaaa"),
                stats: Some(stats(100, 100, 99.9)),
            },
            SubscriptionStatus {
                validator: Validator::new("b", "celestiavalcons1bbbb"),
                stats: None,
            },
        ];
        let message = render_list(&items);
        assert!(message.contains("*a `(99.90% up)`*"));
        assert!(message.contains("*b `(N/A% up)`*"));
    }
}
