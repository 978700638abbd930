use netpulse::core::config::{CollectorKind, CollectorOverride, Config, SnmpConfig};
use netpulse::core::monitor::probes::SnmpQuery;
use netpulse::core::monitor::Metric;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert!(config.snmp.is_none());
    assert_eq!(config.targets.public_ping_host, "8.8.8.8");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_missing_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from(temp_dir.path().join("absent.json")).unwrap();
    assert_eq!(config.log_every_secs, Config::default().log_every_secs);
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("netpulse").join("config.json");

    let mut config = Config::default();
    config.targets.gateway = Some("192.168.1.1".to_string());
    config.collectors.insert(
        CollectorKind::SpeedTest,
        CollectorOverride {
            enabled: Some(false),
            ..Default::default()
        },
    );
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.targets.gateway.as_deref(), Some("192.168.1.1"));
    assert!(!loaded.collector_settings(CollectorKind::SpeedTest).enabled);
    assert!(loaded.collector_settings(CollectorKind::Internet).enabled);
}

#[test]
fn test_config_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "collectors": { "system": { "interval_secs": 5 } } }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let system = config.collector_settings(CollectorKind::System);
    assert_eq!(system.interval, Duration::from_secs(5));
    assert_eq!(config.max_retries, 3);
}

#[test]
fn test_config_malformed_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_config_rejects_bad_targets() {
    let mut config = Config::default();
    config.targets.http_url = "not a url".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.targets.gateway = Some("router.local".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_oid_whose_leading_arcs_overflow() {
    let mut config = Config::default();
    let mut snmp = SnmpConfig::default();
    snmp.queries = vec![SnmpQuery::gauge(Metric::SonicWallCpu, "2.4294967295")];
    config.snmp = Some(snmp);
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_bad_meet_ping_host() {
    let mut config = Config::default();
    config.targets.meet_ping_host = "meet google".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.targets.public_ip_url = "ftp://api.ipify.org".to_string();
    assert!(config.validate().is_err());
}
