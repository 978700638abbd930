use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use netpulse::core::monitor::{
    run_once, Collector, CollectorSpec, Engine, Measurement, Metric, MetricState, MetricValue,
    Probe, ProbeError, ProbeResult, SnapshotLog,
};
use netpulse::core::monitor::BackoffPolicy;
use rand::Rng;
use tempfile::TempDir;

enum Step {
    Value(f64),
    Hang,
}

/// Plays back a fixed script, then hangs forever
struct ScriptedProbe {
    metric: Metric,
    steps: VecDeque<Step>,
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![self.metric]
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        match self.steps.pop_front().unwrap_or(Step::Hang) {
            Step::Value(v) => Ok(Measurement::single(self.metric, MetricValue::Number(v))),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Answers after a random delay of up to 50ms
struct JitteryProbe {
    metric: Metric,
}

#[async_trait]
impl Probe for JitteryProbe {
    fn name(&self) -> &str {
        "jittery"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![self.metric]
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        let delay = rand::thread_rng().gen_range(0..50);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let mut measurement = Measurement::new();
        measurement.push_value(self.metric, delay as f64);
        Ok(measurement)
    }
}

fn scripted(metric: Metric, steps: Vec<Step>) -> Collector {
    let spec = CollectorSpec::new(
        "scripted",
        vec![metric],
        Duration::from_secs(1),
        Duration::from_millis(500),
    )
    .with_retries(0, BackoffPolicy::default());
    Collector::new(
        spec,
        Box::new(ScriptedProbe {
            metric,
            steps: steps.into(),
        }),
    )
}

/// Runs on the dedicated worker and never finishes its first measurement
fn stuck_dedicated(metric: Metric) -> Collector {
    let spec = CollectorSpec::new(
        "speed_test",
        vec![metric],
        Duration::from_secs(300),
        Duration::from_secs(3600),
    )
    .dedicated();
    Collector::new(
        spec,
        Box::new(ScriptedProbe {
            metric,
            steps: VecDeque::new(),
        }),
    )
}

fn jittery(name: &str, metric: Metric) -> Collector {
    let spec = CollectorSpec::new(
        name,
        vec![metric],
        Duration::from_millis(100),
        Duration::from_secs(1),
    );
    Collector::new(spec, Box::new(JitteryProbe { metric }))
}

#[tokio::test(start_paused = true)]
async fn test_value_then_timeout_then_value() {
    let collector = scripted(
        Metric::InternetLatency,
        vec![Step::Value(42.0), Step::Hang, Step::Value(50.0)],
    );
    let engine = Engine::builder().collector(collector).start().unwrap();
    let mut sub = engine.subscribe();

    let first = sub.next().await.unwrap();
    assert!(matches!(
        first.get(Metric::InternetLatency),
        MetricState::Fresh { value: MetricValue::Number(v), .. } if *v == 42.0
    ));

    let second = sub.next().await.unwrap();
    match second.get(Metric::InternetLatency) {
        MetricState::Stale { value, reason, .. } => {
            assert_eq!(*value, MetricValue::Number(42.0));
            assert_eq!(reason, &ProbeError::Timeout.to_string());
        }
        other => panic!("expected stale state, got {:?}", other),
    }

    let third = sub.next().await.unwrap();
    assert_eq!(third.fresh_value(Metric::InternetLatency), Some(50.0));

    let history: Vec<f64> = engine
        .history(Metric::InternetLatency, 10)
        .iter()
        .map(|(_, value)| *value)
        .collect();
    assert_eq!(history, vec![42.0, 50.0]);

    let last = engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(last.fresh_value(Metric::InternetLatency), Some(50.0));
}

#[tokio::test]
async fn test_concurrent_collectors_fill_one_snapshot() {
    let engine = Engine::builder()
        .collector(jittery("internet", Metric::InternetLatency))
        .collector(jittery("system", Metric::CpuPercent))
        .start()
        .unwrap();
    let mut sub = engine.subscribe();

    let complete = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = sub.next().await?;
            if snapshot.fresh_value(Metric::InternetLatency).is_some()
                && snapshot.fresh_value(Metric::CpuPercent).is_some()
            {
                return Some(snapshot);
            }
        }
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(complete.len(), 2);
    let mut names = engine.collector_names();
    names.sort();
    assert_eq!(names, vec!["internet", "system"]);

    engine.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_nothing_published_or_logged_after_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("netpulse.log");

    let engine = Engine::builder()
        .collector(jittery("internet", Metric::InternetLatency))
        .log(SnapshotLog::new(&path))
        .start()
        .unwrap();
    let mut sub = engine.subscribe();

    for _ in 0..3 {
        sub.next().await.unwrap();
    }
    let last = engine.shutdown(Duration::from_secs(1)).await;
    let lines = std::fs::read_to_string(&path).unwrap().lines().count();
    assert!(lines >= 3);

    // Drain whatever was queued before the stop, then the stream ends
    while let Some(snapshot) = sub.next().await {
        assert!(snapshot.timestamp() <= last.timestamp());
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = std::fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(after, lines);
}

#[tokio::test]
async fn test_metric_with_two_owners_is_rejected() {
    let result = Engine::builder()
        .collector(jittery("a", Metric::InternetLatency))
        .collector(jittery("b", Metric::InternetLatency))
        .start();
    assert!(result.is_err());
}

#[test]
fn test_start_outside_runtime_fails() {
    let result = Engine::builder()
        .collector(jittery("a", Metric::InternetLatency))
        .start();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_once_collects_every_collector() {
    let snapshot = run_once(vec![
        jittery("internet", Metric::InternetLatency),
        jittery("system", Metric::RamPercent),
    ])
    .await;

    assert!(snapshot.fresh_value(Metric::InternetLatency).is_some());
    assert!(snapshot.fresh_value(Metric::RamPercent).is_some());
    assert_eq!(*snapshot.get(Metric::DownloadMbps), MetricState::NeverObserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_aborts_stuck_dedicated_collector_after_grace() {
    let engine = Engine::builder()
        .collector(stuck_dedicated(Metric::DownloadMbps))
        .collector(jittery("system", Metric::CpuPercent))
        .start()
        .unwrap();
    let mut sub = engine.subscribe();

    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(snapshot) = sub.next().await {
            if snapshot.fresh_value(Metric::CpuPercent).is_some() {
                break;
            }
        }
    })
    .await
    .unwrap();

    let grace = Duration::from_millis(300);
    let started = std::time::Instant::now();
    let last = engine.shutdown(grace).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= grace, "returned before the grace period: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "shutdown hung: {:?}", elapsed);
    assert!(last.fresh_value(Metric::CpuPercent).is_some());
    assert_eq!(*last.get(Metric::DownloadMbps), MetricState::NeverObserved);
}
