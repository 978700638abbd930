use thiserror::Error;

/// Failure of a single probe measurement.
///
/// These never leave a collector: they become stale or not-applicable entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not applicable")]
    NotApplicable,

    #[error("counter anomaly: {0}")]
    CounterAnomaly(String),
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    pub fn unreachable<S: Into<String>>(msg: S) -> Self {
        ProbeError::Unreachable(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        ProbeError::Protocol(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        ProbeError::PermissionDenied(msg.into())
    }

    pub fn counter_anomaly<S: Into<String>>(msg: S) -> Self {
        ProbeError::CounterAnomaly(msg.into())
    }

    /// Failure to launch an external measurement tool (ping, traceroute, netsh)
    pub fn from_command(tool: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                ProbeError::PermissionDenied(format!("{}: {}", tool, err))
            }
            _ => ProbeError::Protocol(format!("failed to run {}: {}", tool, err)),
        }
    }

    /// Anything other than "not applicable" counts as a failed attempt
    pub fn is_failure(&self) -> bool {
        !matches!(self, ProbeError::NotApplicable)
    }
}
