use chrono::{DateTime, Local, Utc};
use colored::*;

use crate::core::monitor::{Health, HealthStatus, Metric, MetricState, MetricValue, Snapshot, Unit};
use crate::core::netinfo::NetworkInfo;

/// Format a timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Format an age compactly (45s, 3m, 2h, 1d)
pub fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

/// Value with its unit, e.g. "42.5 ms" or "yes"
pub fn format_value(metric: Metric, value: &MetricValue) -> String {
    match value {
        MetricValue::Flag(true) => "yes".to_string(),
        MetricValue::Flag(false) => "no".to_string(),
        _ => match metric.unit() {
            Unit::Percent => format!("{}%", value),
            Unit::Count | Unit::None => value.to_string(),
            unit => format!("{} {}", value, unit.suffix()),
        },
    }
}

/// Plain-text rendering of one metric's state.
///
/// Never-observed metrics read "no data", never zero.
pub fn format_state(metric: Metric, state: &MetricState, now: DateTime<Utc>) -> String {
    match state {
        MetricState::NeverObserved => "no data".to_string(),
        MetricState::NotApplicable => "n/a".to_string(),
        MetricState::Fresh { value, .. } => format_value(metric, value),
        MetricState::Stale {
            value, observed_at, ..
        } => format!(
            "{} (stale, {} ago)",
            format_value(metric, value),
            format_age(now - *observed_at)
        ),
    }
}

fn colorize_state(text: String, state: &MetricState) -> ColoredString {
    match state {
        MetricState::Fresh { .. } => text.green(),
        MetricState::Stale { .. } => text.yellow(),
        MetricState::NeverObserved | MetricState::NotApplicable => text.dimmed(),
    }
}

pub fn format_status(status: HealthStatus) -> ColoredString {
    match status {
        HealthStatus::Ok => status.to_string().green().bold(),
        HealthStatus::HighLatency => status.to_string().yellow().bold(),
        HealthStatus::Down => status.to_string().red().bold(),
    }
}

/// Print a snapshot as a table, one metric per line
pub fn print_snapshot(snapshot: &Snapshot, health: &Health) {
    let now = Utc::now();
    let stamp = snapshot
        .timestamp()
        .map(format_time)
        .unwrap_or_else(|| "no data yet".to_string());

    println!("{} {}", "Snapshot".white().bold(), stamp.dimmed());
    for metric in Metric::ALL {
        let state = snapshot.get(metric);
        let text = format_state(metric, state, now);
        println!("  {:<22} {}", metric.label(), colorize_state(text, state));
    }
    println!(
        "  {:<22} {}  stability {}  meeting {}",
        "Status",
        format_status(health.status),
        health.stability_score.to_string().cyan(),
        health.meeting_score.to_string().cyan()
    );
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Plain-text rows describing the connection, as (label, value)
pub fn network_rows(info: &NetworkInfo) -> Vec<(&'static str, String)> {
    let dns = if info.dns_servers.is_empty() {
        "-".to_string()
    } else {
        info.dns_servers
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        ("Interface", or_dash(info.interface.as_deref())),
        ("Local IP", or_dash(info.local_ip)),
        ("Gateway", or_dash(info.gateway)),
        ("DNS servers", dns),
        ("Public IP", or_dash(info.public_ip)),
    ]
}

pub fn print_network_info(info: &NetworkInfo) {
    println!("{}", "Network".white().bold());
    for (label, value) in network_rows(info) {
        println!("  {:<22} {}", label, value.cyan());
    }
}

/// One-line summary used while monitoring
pub fn format_summary(snapshot: &Snapshot, health: &Health) -> String {
    let now = Utc::now();
    let pick = |metric: Metric| format_state(metric, snapshot.get(metric), now);
    format!(
        "{} latency {} | loss {} | http {} | cpu {} | status {} ({}/{})",
        snapshot
            .timestamp()
            .map(format_time)
            .unwrap_or_else(|| "-".to_string()),
        pick(Metric::InternetLatency),
        pick(Metric::PacketLoss),
        pick(Metric::HttpLatency),
        pick(Metric::CpuPercent),
        format_status(health.status),
        health.stability_score,
        health.meeting_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_age(chrono::Duration::seconds(185)), "3m");
        assert_eq!(format_age(chrono::Duration::seconds(7_300)), "2h");
        assert_eq!(format_age(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_format_value_units() {
        assert_eq!(
            format_value(Metric::InternetLatency, &MetricValue::Number(42.5)),
            "42.5 ms"
        );
        assert_eq!(format_value(Metric::PacketLoss, &MetricValue::Percent(20.0)), "20%");
        assert_eq!(format_value(Metric::VpnActive, &MetricValue::Flag(true)), "yes");
        assert_eq!(
            format_value(Metric::SonicWallSessions, &MetricValue::Number(1234.0)),
            "1234"
        );
    }

    #[test]
    fn test_stale_and_missing_states() {
        let observed = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let now = observed + chrono::Duration::seconds(30);

        let stale = MetricState::Stale {
            value: MetricValue::Number(42.0),
            observed_at: observed,
            reason: "timed out".into(),
        };
        assert_eq!(
            format_state(Metric::InternetLatency, &stale, now),
            "42 ms (stale, 30s ago)"
        );
        assert_eq!(
            format_state(Metric::DownloadMbps, &MetricState::NeverObserved, now),
            "no data"
        );
        assert_eq!(
            format_state(Metric::VpnLatency, &MetricState::NotApplicable, now),
            "n/a"
        );
    }

    #[test]
    fn test_network_rows_show_dash_for_unknowns() {
        let info = NetworkInfo {
            interface: Some("eth0".to_string()),
            local_ip: Some("192.168.1.34".parse().unwrap()),
            gateway: None,
            dns_servers: vec!["192.168.1.1".parse().unwrap(), "8.8.8.8".parse().unwrap()],
            public_ip: None,
        };
        let rows = network_rows(&info);
        assert_eq!(rows[0], ("Interface", "eth0".to_string()));
        assert_eq!(rows[2], ("Gateway", "-".to_string()));
        assert_eq!(rows[3], ("DNS servers", "192.168.1.1, 8.8.8.8".to_string()));
        assert_eq!(rows[4], ("Public IP", "-".to_string()));
    }
}
