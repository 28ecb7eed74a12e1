use crate::model::{Config, OutputConfig, OutputFormat, ProtocolVersion, TargetSpec};
use clap::{ArgAction, Parser};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "TLS protocol and cipher-suite scanner", long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Host to scan
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: String,

    /// Port to scan
    #[arg(short = 'p', long = "port", default_value_t = 443)]
    pub port: u16,

    /// Protocol version to probe (repeatable; default: all)
    #[arg(long = "version", value_name = "VERSION")]
    pub versions: Vec<ProtocolVersion>,

    /// Per-probe timeout in milliseconds
    #[arg(long = "timeout", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Simultaneous probes per protocol version
    #[arg(long = "concurrency", default_value_t = 10)]
    pub concurrency: usize,

    /// Ceiling on simultaneous connections to the target
    #[arg(long = "max-connections", default_value_t = 20)]
    pub max_connections: usize,

    /// Overall scan deadline in milliseconds (default: none)
    #[arg(long = "deadline", value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Output format
    #[arg(long = "output", default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Shorthand for --output jsonl
    #[arg(long = "jsonl", action = ArgAction::SetTrue)]
    pub jsonl: bool,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<(TargetSpec, Config)> {
        if self.host.trim().is_empty() {
            anyhow::bail!("--host must not be empty");
        }

        if self.port == 0 {
            anyhow::bail!("--port must be nonzero");
        }

        if self.timeout_ms == 0 {
            anyhow::bail!("timeout must be greater than zero");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max-connections must be greater than zero");
        }

        let versions = if self.versions.is_empty() {
            ProtocolVersion::ALL.to_vec()
        } else {
            self.versions
        };

        let target = TargetSpec {
            host: self.host.trim().to_string(),
            port: self.port,
        };

        Ok((
            target,
            Config {
                versions,
                probe_timeout: Duration::from_millis(self.timeout_ms),
                concurrency: self.concurrency,
                max_connections: self.max_connections,
                deadline: self.deadline_ms.map(Duration::from_millis),
                output: OutputConfig {
                    format: if self.jsonl {
                        OutputFormat::Jsonl
                    } else {
                        self.output
                    },
                },
            },
        ))
    }
}
