//! src/main.rs
//! Replays a dumped measurement snapshot through the shutdown reporter.
//!
//! ```text
//! joular-report <snapshot.json> [--config <file>] [--pid <pid>]
//! ```

use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use joular_core::{
    Logger, MeasurementSnapshot, ShutdownHandler, ShutdownReport, StepOutcome,
    config::AgentProperties,
    monitor::NoopResource, result::CsvResultWriter,
};

const USAGE: &str = "usage: joular-report <snapshot.json> [--config <file>] [--pid <pid>]";

#[derive(Debug)]
struct Args {
    snapshot: PathBuf,
    config: Option<PathBuf>,
    pid: u32,
}

impl Args {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Result<Self> {
        let mut snapshot = None;
        let mut config = None;
        let mut pid = std::process::id();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args.next().context("--config needs a file")?;
                    config = Some(PathBuf::from(value));
                }
                "--pid" => {
                    let value = args.next().context("--pid needs a value")?;
                    pid = value
                        .parse()
                        .with_context(|| format!("invalid pid '{value}'"))?;
                }
                "-h" | "--help" => bail!(USAGE),
                other if snapshot.is_none() && !other.starts_with('-') => {
                    snapshot = Some(PathBuf::from(other));
                }
                other => bail!("unexpected argument '{other}'\n{USAGE}"),
            }
        }

        Ok(Self {
            snapshot: snapshot.context(USAGE)?,
            config,
            pid,
        })
    }
}

/// Steps of `report` that did not complete, by name.
fn incomplete_steps(report: &ShutdownReport) -> Vec<(&'static str, &StepOutcome)> {
    [
        ("Monitoring resource release", &report.resource_release),
        ("Methods energy", &report.methods),
        ("Methods consumption evolution", &report.consumption_evolution),
        ("Call trees energy", &report.call_trees),
    ]
    .into_iter()
    .filter(|(_, outcome)| !(outcome.is_completed() || **outcome == StepOutcome::Disabled))
    .collect()
}

/// Reports what the shutdown stage could not do. Write failures were already
/// handled there, so they never fail the process.
fn finish(report: &ShutdownReport) -> Result<()> {
    for (step, outcome) in incomplete_steps(report) {
        warn!("{step} did not complete: {outcome}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;

    let properties = match &args.config {
        Some(path) => AgentProperties::load(path),
        None => AgentProperties::discover(),
    }
    .context("Failed to load agent properties")?;

    let _guard = Logger::init(&properties).context("Failed to initialize logging")?;

    let text = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("Failed to read snapshot {}", args.snapshot.display()))?;
    let snapshot = MeasurementSnapshot::from_json(&text)
        .with_context(|| format!("Invalid snapshot {}", args.snapshot.display()))?;

    info!("Replaying snapshot {}", args.snapshot.display());
    let report = ShutdownHandler::new(
        args.pid,
        CsvResultWriter::new(),
        Box::new(NoopResource),
        snapshot,
        properties,
    )
    .run();

    finish(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_all_flags() {
        let args = parse(&["snap.json", "--config", "agent.toml", "--pid", "1234"]).unwrap();
        assert_eq!(args.snapshot, PathBuf::from("snap.json"));
        assert_eq!(args.config, Some(PathBuf::from("agent.toml")));
        assert_eq!(args.pid, 1234);
    }

    #[test]
    fn test_parse_defaults_pid_to_self() {
        let args = parse(&["snap.json"]).unwrap();
        assert_eq!(args.pid, std::process::id());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_write_failures_do_not_fail_the_process() {
        let report = ShutdownReport {
            resource_release: StepOutcome::Completed,
            methods: StepOutcome::Failed("I/O error on does/not/exist".into()),
            ..ShutdownReport::default()
        };

        let steps: Vec<&str> = incomplete_steps(&report).iter().map(|(s, _)| *s).collect();
        assert_eq!(
            steps,
            ["Methods energy", "Methods consumption evolution", "Call trees energy"]
        );
        assert!(finish(&report).is_ok());
    }

    #[test]
    fn test_complete_report_has_nothing_to_warn() {
        let report = ShutdownReport {
            resource_release: StepOutcome::Completed,
            methods: StepOutcome::Completed,
            consumption_evolution: StepOutcome::Disabled,
            call_trees: StepOutcome::Completed,
            files: Vec::new(),
        };
        assert!(incomplete_steps(&report).is_empty());
        assert!(finish(&report).is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["snap.json", "--pid", "abc"]).is_err());
        assert!(parse(&["snap.json", "--config"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
    }
}
