use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub versions: Vec<ProtocolVersion>,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    pub max_connections: usize,
    pub deadline: Option<Duration>,
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize, ValueEnum)]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// SSL/TLS protocol versions the scanner can probe, oldest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum ProtocolVersion {
    #[value(name = "ssl3.0", alias = "ssl3")]
    #[serde(rename = "ssl3.0")]
    Ssl30,
    #[value(name = "tls1.0", alias = "tls10")]
    #[serde(rename = "tls1.0")]
    Tls10,
    #[value(name = "tls1.1", alias = "tls11")]
    #[serde(rename = "tls1.1")]
    Tls11,
    #[value(name = "tls1.2", alias = "tls12")]
    #[serde(rename = "tls1.2")]
    Tls12,
    #[value(name = "tls1.3", alias = "tls13")]
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 5] = [
        ProtocolVersion::Ssl30,
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls13,
    ];

    /// Version bytes carried in the ClientHello body. TLS1.3 keeps the
    /// legacy 0x0303 there and signals 0x0304 via supported_versions.
    pub fn wire_bytes(self) -> [u8; 2] {
        match self {
            ProtocolVersion::Ssl30 => [0x03, 0x00],
            ProtocolVersion::Tls10 => [0x03, 0x01],
            ProtocolVersion::Tls11 => [0x03, 0x02],
            ProtocolVersion::Tls12 => [0x03, 0x03],
            ProtocolVersion::Tls13 => [0x03, 0x04],
        }
    }

    /// Version bytes for the outer record header. Old middleboxes drop
    /// records claiming versions above TLS1.0, so TLS-shaped hellos go out
    /// as 0x0301.
    pub fn record_bytes(self) -> [u8; 2] {
        match self {
            ProtocolVersion::Ssl30 => [0x03, 0x00],
            _ => [0x03, 0x01],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::Ssl30 => "ssl3.0",
            ProtocolVersion::Tls10 => "tls1.0",
            ProtocolVersion::Tls11 => "tls1.1",
            ProtocolVersion::Tls12 => "tls1.2",
            ProtocolVersion::Tls13 => "tls1.3",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cipher suite identifier from the IANA registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CipherSuite {
    pub id: u16,
    pub name: &'static str,
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    HandshakeFailure,
    ProtocolVersion,
    InsufficientSecurity,
    RetryRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    /// Connection could not be established for a non-transient reason
    /// (e.g. name resolution); never retried.
    ConnectionFailed,
    Malformed,
    UnexpectedMessage,
    Cancelled,
}

/// Result of one (version, suite) handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Accepted { suite: CipherSuite },
    Rejected { reason: RejectReason },
    Error { reason: ErrorReason },
}

impl ProbeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ProbeOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    pub suite: CipherSuite,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

/// All probe outcomes for one protocol version, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct VersionReport {
    pub version: ProtocolVersion,
    pub outcomes: Vec<SuiteResult>,
}

impl VersionReport {
    pub fn accepted(&self) -> Vec<CipherSuite> {
        self.outcomes
            .iter()
            .filter(|r| r.outcome.is_accepted())
            .map(|r| r.suite)
            .collect()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, ProbeOutcome::Rejected { .. }))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, ProbeOutcome::Error { .. }))
            .count()
    }
}

/// Root scan result: one VersionReport per requested version.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: TargetSpec,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub versions: BTreeMap<ProtocolVersion, VersionReport>,
}
