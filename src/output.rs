//! Report presentation: JSONL for machines, a per-version listing for
//! humans. The scan engine only hands over a finished `ScanReport`; nothing
//! here feeds back into probing.

use crate::model::{OutputConfig, OutputFormat, ProbeOutcome, ScanReport, VersionReport};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct VersionLine<'a> {
    host: &'a str,
    port: u16,
    started_at: &'a chrono::DateTime<chrono::Utc>,
    version: &'a str,
    accepted: Vec<&'static str>,
    outcomes: &'a [crate::model::SuiteResult],
}

pub fn write_report(cfg: &OutputConfig, report: &ScanReport) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut writer = std::io::BufWriter::new(stdout.lock());
    match cfg.format {
        OutputFormat::Jsonl => write_jsonl(&mut writer, report)?,
        OutputFormat::Pretty => write_pretty(&mut writer, report)?,
    }
    writer.flush()?;
    Ok(())
}

fn write_jsonl<W: Write>(writer: &mut W, report: &ScanReport) -> anyhow::Result<()> {
    for (version, version_report) in &report.versions {
        let line = VersionLine {
            host: &report.target.host,
            port: report.target.port,
            started_at: &report.started_at,
            version: version.as_str(),
            accepted: version_report.accepted().iter().map(|s| s.name).collect(),
            outcomes: &version_report.outcomes,
        };
        writeln!(writer, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(())
}

fn write_pretty<W: Write>(writer: &mut W, report: &ScanReport) -> anyhow::Result<()> {
    writeln!(writer, "{}", report.target)?;
    for (version, version_report) in &report.versions {
        writeln!(writer, "  {}: {}", version, summary(version_report))?;
        for suite in version_report.accepted() {
            writeln!(writer, "    {}", suite)?;
        }
        for result in &version_report.outcomes {
            if let ProbeOutcome::Error { reason } = result.outcome {
                writeln!(writer, "    ! {} -> {:?}", result.suite.name, reason)?;
            }
        }
    }
    Ok(())
}

fn summary(report: &VersionReport) -> String {
    let accepted = report.accepted().len();
    if accepted > 0 {
        format!(
            "{} accepted, {} rejected, {} errors",
            accepted,
            report.rejected_count(),
            report.error_count()
        )
    } else if report.error_count() == report.outcomes.len() {
        "unreachable (all probes errored)".to_string()
    } else {
        "not supported".to_string()
    }
}
