//! SNMPv2c polling of the firewall: gauges read directly, interface
//! octet counters turned into throughput.

pub mod ber;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use super::counter::{bytes_per_sec_to_mbps, CounterRate};
use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric};
use crate::error::{NetpulseError, Result};
use ber::Oid;

const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Value is reported as read
    #[default]
    Gauge,
    /// Octet counter, reported as Mbps between consecutive polls
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpQuery {
    pub metric: Metric,
    pub oid: String,
    #[serde(default)]
    pub mode: QueryMode,
}

impl SnmpQuery {
    pub fn gauge<S: Into<String>>(metric: Metric, oid: S) -> Self {
        Self {
            metric,
            oid: oid.into(),
            mode: QueryMode::Gauge,
        }
    }

    pub fn counter<S: Into<String>>(metric: Metric, oid: S) -> Self {
        Self {
            metric,
            oid: oid.into(),
            mode: QueryMode::Counter,
        }
    }
}

struct ParsedQuery {
    metric: Metric,
    oid: Oid,
    mode: QueryMode,
}

pub struct SnmpProbe {
    name: String,
    target: SocketAddr,
    community: String,
    queries: Vec<ParsedQuery>,
    rates: HashMap<Metric, CounterRate>,
    request_id: i32,
}

impl SnmpProbe {
    pub fn new<S: Into<String>>(target: SocketAddr, community: S, queries: &[SnmpQuery]) -> Result<Self> {
        let queries = queries
            .iter()
            .map(|q| {
                let oid = q.oid.parse::<Oid>().map_err(|e| {
                    NetpulseError::config(format!("{} for {}", e, q.metric.key()))
                })?;
                Ok(ParsedQuery {
                    metric: q.metric,
                    oid,
                    mode: q.mode,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if queries.is_empty() {
            return Err(NetpulseError::config("SNMP probe needs at least one query"));
        }

        Ok(Self {
            name: format!("snmp {}", target),
            target,
            community: community.into(),
            queries,
            rates: HashMap::new(),
            request_id: std::process::id() as i32 & 0x7fff_0000,
        })
    }

    fn next_request_id(&mut self) -> i32 {
        self.request_id = self.request_id.wrapping_add(1) & 0x7fff_ffff;
        self.request_id
    }

    async fn exchange(&mut self, timeout: Duration) -> ProbeResult<ber::SnmpResponse> {
        let bind: SocketAddr = if self.target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| ProbeError::protocol(format!("udp bind: {}", e)))?;
        socket
            .connect(self.target)
            .await
            .map_err(|e| ProbeError::unreachable(format!("{}: {}", self.target, e)))?;

        let request_id = self.next_request_id();
        let oids: Vec<Oid> = self.queries.iter().map(|q| q.oid.clone()).collect();
        let request = ber::encode_get_request(&self.community, request_id, &oids);

        socket
            .send(&request)
            .await
            .map_err(|e| ProbeError::unreachable(format!("{}: {}", self.target, e)))?;

        let receive = async {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let len = socket
                    .recv(&mut buf)
                    .await
                    .map_err(|e| ProbeError::unreachable(format!("{}: {}", self.target, e)))?;
                match ber::decode_response(&buf[..len]) {
                    Ok(response) if response.request_id == request_id => return Ok(response),
                    Ok(response) => {
                        log::debug!(
                            "ignoring SNMP response {} while waiting for {}",
                            response.request_id,
                            request_id
                        );
                    }
                    Err(e) => return Err(ProbeError::protocol(format!("malformed response: {}", e))),
                }
            }
        };

        // A wrong community is usually answered with silence
        tokio::time::timeout(timeout, receive)
            .await
            .map_err(|_| ProbeError::Timeout)?
    }
}

#[async_trait]
impl Probe for SnmpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Vec<Metric> {
        self.queries.iter().map(|q| q.metric).collect()
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        let response = self.exchange(timeout).await?;
        let polled_at = Instant::now();

        match response.error_status {
            0 => {}
            ber::ERROR_AUTHORIZATION => {
                return Err(ProbeError::permission_denied(format!(
                    "agent {} rejected community",
                    self.target
                )))
            }
            status => {
                return Err(ProbeError::protocol(format!(
                    "agent {} returned error-status {} at index {}",
                    self.target, status, response.error_index
                )))
            }
        }

        let mut measurement = Measurement::new();
        for query in &self.queries {
            let value = response
                .varbinds
                .iter()
                .find(|(oid, _)| *oid == query.oid)
                .map(|(_, value)| value);

            let value = match value {
                Some(v) if !v.is_exception() => v,
                Some(_) | None => {
                    measurement.push_error(
                        query.metric,
                        ProbeError::protocol(format!("no such object {}", query.oid)),
                    );
                    continue;
                }
            };

            match query.mode {
                QueryMode::Gauge => match value.as_f64() {
                    Some(v) => measurement.push_value(query.metric, round2(v)),
                    None => measurement.push_error(
                        query.metric,
                        ProbeError::protocol(format!("non-numeric value for {}", query.oid)),
                    ),
                },
                QueryMode::Counter => {
                    let Some(count) = value.as_counter() else {
                        measurement.push_error(
                            query.metric,
                            ProbeError::protocol(format!("{} is not a counter", query.oid)),
                        );
                        continue;
                    };
                    let rate = self.rates.entry(query.metric).or_default();
                    match rate.observe(count, polled_at) {
                        Ok(Some(bytes_per_sec)) => {
                            measurement.push_value(query.metric, round2(bytes_per_sec_to_mbps(bytes_per_sec)))
                        }
                        // First sample only establishes the baseline
                        Ok(None) => {}
                        Err(e) => measurement.push_error(query.metric, e),
                    }
                }
            }
        }

        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::metrics::MetricValue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const CPU_OID: &str = "1.3.6.1.4.1.8741.1.3.1.3.0";
    const IN_OID: &str = "1.3.6.1.2.1.2.2.1.10.1";

    /// Answers every GET with a CPU gauge of 37 and an octet counter that
    /// grows by 1 MB per request
    async fn fake_agent(error_status: i64) -> (SocketAddr, Arc<AtomicU32>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let served = Arc::new(AtomicU32::new(0));
        let counter = served.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else { return };
                let (request_id, oids) = ber::decode_get_request(&buf[..len]).unwrap();
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;

                let varbinds: Vec<(Oid, u8, Vec<u8>)> = oids
                    .into_iter()
                    .map(|oid| {
                        let text = oid.to_string();
                        if text == CPU_OID {
                            (oid, 0x42, vec![37])
                        } else if text == IN_OID {
                            (oid, 0x41, (n * 1_000_000).to_be_bytes().to_vec())
                        } else {
                            (oid, 0x80, vec![])
                        }
                    })
                    .collect();
                let response = ber::encode_response("public", request_id, error_status, &varbinds);
                let _ = socket.send_to(&response, peer).await;
            }
        });

        (addr, served)
    }

    fn queries() -> Vec<SnmpQuery> {
        vec![
            SnmpQuery::gauge(Metric::SonicWallCpu, CPU_OID),
            SnmpQuery::counter(Metric::WanInMbps, IN_OID),
        ]
    }

    #[tokio::test]
    async fn test_gauge_and_counter_rate() {
        let (addr, served) = fake_agent(0).await;
        let mut probe = SnmpProbe::new(addr, "public", &queries()).unwrap();

        let first = probe.measure(Duration::from_secs(2)).await.unwrap();
        assert_eq!(
            first.get(Metric::SonicWallCpu),
            Some(&Ok(MetricValue::Percent(37.0)))
        );
        // Baseline only
        assert!(first.get(Metric::WanInMbps).is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = probe.measure(Duration::from_secs(2)).await.unwrap();
        match second.get(Metric::WanInMbps) {
            Some(Ok(value)) => assert!(value.as_f64() > 0.0),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_object_fails_only_that_metric() {
        let (addr, _) = fake_agent(0).await;
        let queries = vec![
            SnmpQuery::gauge(Metric::SonicWallCpu, CPU_OID),
            SnmpQuery::gauge(Metric::SonicWallSessions, "1.3.6.1.4.1.8741.1.3.1.99.0"),
        ];
        let mut probe = SnmpProbe::new(addr, "public", &queries).unwrap();
        let measurement = probe.measure(Duration::from_secs(2)).await.unwrap();

        assert!(matches!(measurement.get(Metric::SonicWallCpu), Some(Ok(_))));
        assert!(matches!(
            measurement.get(Metric::SonicWallSessions),
            Some(Err(ProbeError::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn test_authorization_error_is_permission_denied() {
        let (addr, _) = fake_agent(ber::ERROR_AUTHORIZATION).await;
        let mut probe = SnmpProbe::new(addr, "wrong", &queries()).unwrap();
        let err = probe.measure(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProbeError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_silent_agent_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let mut probe = SnmpProbe::new(addr, "public", &queries()).unwrap();
        let err = probe.measure(Duration::from_millis(100)).await.unwrap_err();
        assert_eq!(err, ProbeError::Timeout);
        drop(silent);
    }

    #[test]
    fn test_invalid_oid_is_config_error() {
        let addr: SocketAddr = "127.0.0.1:161".parse().unwrap();
        let bad = vec![SnmpQuery::gauge(Metric::SonicWallCpu, "not.an.oid")];
        assert!(SnmpProbe::new(addr, "public", &bad).is_err());
        assert!(SnmpProbe::new(addr, "public", &[]).is_err());

        let overflowing = vec![SnmpQuery::gauge(Metric::SonicWallCpu, "2.4294967295")];
        assert!(SnmpProbe::new(addr, "public", &overflowing).is_err());
    }
}
