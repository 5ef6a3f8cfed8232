//! src/shutdown.rs
//! ============================================================================
//! # ShutdownHandler: end-of-run energy report
//!
//! Runs once, as the agent's last action:
//! 1. release the monitoring resource
//! 2. log the consumption summary
//! 3. write the method datasets (mandatory)
//! 4. write per-method evolution files (optional)
//! 5. write the call-tree datasets (optional)
//! 6. log completion and peak memory
//!
//! Each step reports a [`StepOutcome`]. A release failure never stops the
//! run. Persistence (steps 3 to 5) is a single block: the first write error
//! ends it and the remaining persistence steps are reported as skipped.

use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::{error, info, warn};

use crate::{
    config::AgentProperties,
    error::Result,
    monitor::MonitoringResource,
    result::{ResultWriter, Target},
    status::{EnergyMap, EvolutionMap, MeasurementSnapshot},
};

const FILE_PREFIX: &str = "joularJX";
const ENERGY_DATA_TYPE: &str = "energy";
const BYTES_PER_MEGABYTE: u64 = 1_000_000;

pub const ALL_METHODS: &str = "all-methods";
pub const FILTERED_METHODS: &str = "filtered-methods";
pub const ALL_CALL_TREES: &str = "all-call-trees";
pub const FILTERED_CALL_TREES: &str = "filtered-call-trees";

/// Which evolution branch a mapping belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Filtered,
}

impl Scope {
    pub const ALL_SCOPES: [Scope; 2] = [Scope::All, Scope::Filtered];

    /// Evolution sub-folder name.
    pub fn folder_name(self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Filtered => "filtered",
        }
    }
}

/// Result of one shutdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// Turned off in the agent properties
    Disabled,
    /// Not attempted because an earlier persistence step failed
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Disabled => f.write_str("disabled"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// What [`ShutdownHandler::run`] managed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub resource_release: StepOutcome,
    pub methods: StepOutcome,
    pub consumption_evolution: StepOutcome,
    pub call_trees: StepOutcome,
    /// Every target finalized, as named to the writer, in write order
    pub files: Vec<PathBuf>,
}

impl Default for ShutdownReport {
    fn default() -> Self {
        Self {
            resource_release: StepOutcome::Skipped,
            methods: StepOutcome::Skipped,
            consumption_evolution: StepOutcome::Skipped,
            call_trees: StepOutcome::Skipped,
            files: Vec::new(),
        }
    }
}

/// Outcome of one evolution export call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvolutionExport {
    Written(usize),
    /// The named folder could not be created; nothing was written
    FolderUnavailable(PathBuf),
}

/// `Program consumed <total> joules`, two decimals.
pub fn energy_summary(total_energy: f64) -> String {
    format!("Program consumed {total_energy:.2} joules")
}

/// Console variant of [`energy_summary`]; the spelling is part of the output format.
pub fn console_energy_summary(total_energy: f64) -> String {
    format!("Program consummed {total_energy:.2} joules")
}

/// `Max memory usage : <bytes / 1_000_000> MB`, truncated.
pub fn memory_summary(peak_memory_bytes: u64) -> String {
    format!(
        "Max memory usage : {} MB",
        peak_memory_bytes / BYTES_PER_MEGABYTE
    )
}

/// Replaces the characters of synthetic method names (`<init>`, `<clinit>`,
/// lambdas) that do not belong in file names.
pub fn sanitize_method_name(method: &str) -> String {
    method.replace(['<', '>'], "_")
}

/// `joularJX-<pid>-<node_type>-<data_type>`
pub fn dataset_file_name(app_pid: u32, node_type: &str, data_type: &str) -> String {
    format!("{FILE_PREFIX}-{app_pid}-{node_type}-{data_type}")
}

/// `joularJX-<pid>-<sanitized method>-evolution`
pub fn evolution_file_name(app_pid: u32, method: &str) -> String {
    format!(
        "{FILE_PREFIX}-{app_pid}-{}-evolution",
        sanitize_method_name(method)
    )
}

/// Writes the end-of-run report. Consumed by [`ShutdownHandler::run`].
pub struct ShutdownHandler<W: ResultWriter> {
    app_pid: u32,
    writer: W,
    resource: Box<dyn MonitoringResource>,
    snapshot: MeasurementSnapshot,
    properties: AgentProperties,
    console: Box<dyn Write + Send>,
    files: Vec<PathBuf>,
}

impl<W: ResultWriter> ShutdownHandler<W> {
    pub fn new(
        app_pid: u32,
        writer: W,
        resource: Box<dyn MonitoringResource>,
        snapshot: MeasurementSnapshot,
        properties: AgentProperties,
    ) -> Self {
        Self {
            app_pid,
            writer,
            resource,
            snapshot,
            properties,
            console: Box::new(io::stdout()),
            files: Vec::new(),
        }
    }

    /// Sends the console summary lines to `console` instead of stdout.
    pub fn with_console(mut self, console: impl Write + Send + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn run(mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        report.resource_release = match self.resource.close() {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!("Monitoring resource was not released cleanly: {e}");
                StepOutcome::Failed(e.to_string())
            }
        };

        let total = self.snapshot.total_consumed_energy;
        info!(
            "JoularJX finished monitoring application with ID {}",
            self.app_pid
        );
        info!("{}", energy_summary(total));
        self.print(&console_energy_summary(total));

        self.persist(&mut report);
        report.files = std::mem::take(&mut self.files);

        info!("Energy consumption of methods and filtered methods written to files");
        self.print(&memory_summary(self.snapshot.peak_memory_bytes));

        report
    }

    fn print(&mut self, line: &str) {
        if let Err(e) = writeln!(self.console, "{line}").and_then(|()| self.console.flush()) {
            warn!("Failed to print shutdown summary: {e}");
        }
    }

    /// Steps 3 to 5. The outcome fields are set in order; the first error
    /// marks its own step failed and leaves the later ones skipped.
    fn persist(&mut self, report: &mut ShutdownReport) {
        if let Err(e) = self.save_method_datasets() {
            error!("Failed to write methods energy: {e}");
            report.methods = StepOutcome::Failed(e.to_string());
            return;
        }
        report.methods = StepOutcome::Completed;

        if !self.properties.track_consumption_evolution {
            report.consumption_evolution = StepOutcome::Disabled;
        } else {
            match self.export_evolutions() {
                Ok(outcome) => report.consumption_evolution = outcome,
                Err(e) => {
                    error!("Failed to write methods consumption evolution: {e}");
                    report.consumption_evolution = StepOutcome::Failed(e.to_string());
                    return;
                }
            }
        }

        report.call_trees = if !self.properties.call_trees_consumption {
            StepOutcome::Disabled
        } else {
            match self.save_call_tree_datasets() {
                Ok(()) => StepOutcome::Completed,
                Err(e) => {
                    error!("Failed to write call trees energy: {e}");
                    StepOutcome::Failed(e.to_string())
                }
            }
        };
    }

    fn save_method_datasets(&mut self) -> Result<()> {
        let methods = std::mem::take(&mut self.snapshot.methods_energy);
        let filtered = std::mem::take(&mut self.snapshot.filtered_methods_energy);
        self.save_results(&methods, ALL_METHODS, ENERGY_DATA_TYPE)?;
        self.save_results(&filtered, FILTERED_METHODS, ENERGY_DATA_TYPE)
    }

    fn save_call_tree_datasets(&mut self) -> Result<()> {
        let trees = std::mem::take(&mut self.snapshot.call_trees_energy);
        let filtered = std::mem::take(&mut self.snapshot.filtered_call_trees_energy);
        self.save_results(&trees, ALL_CALL_TREES, ENERGY_DATA_TYPE)?;
        self.save_results(&filtered, FILTERED_CALL_TREES, ENERGY_DATA_TYPE)
    }

    fn export_evolutions(&mut self) -> Result<StepOutcome> {
        let all = std::mem::take(&mut self.snapshot.methods_evolution);
        let filtered = std::mem::take(&mut self.snapshot.filtered_methods_evolution);

        let mut unavailable = Vec::new();
        for (evolution, scope) in [(&all, Scope::All), (&filtered, Scope::Filtered)] {
            if let EvolutionExport::FolderUnavailable(dir) =
                self.write_consumption_evolution(evolution, scope)?
            {
                unavailable.push(dir.display().to_string());
            }
        }

        Ok(if unavailable.is_empty() {
            StepOutcome::Completed
        } else {
            StepOutcome::Failed(format!("cannot create {}", unavailable.join(", ")))
        })
    }

    /// Writes one flat dataset to `joularJX-<pid>-<node_type>-<data_type>`
    /// under the output directory, replacing any previous content.
    pub fn save_results(&mut self, energy: &EnergyMap, node_type: &str, data_type: &str) -> Result<()> {
        let name = self
            .properties
            .output_dir
            .join(dataset_file_name(self.app_pid, node_type, data_type));
        self.write_dataset(&name, energy.iter().map(|(key, value)| (key.as_str(), *value)))
    }

    /// Writes one file per method under `<evolution root>/<scope folder>`.
    ///
    /// Both scope folders are created on every call. If either cannot be
    /// created the export is abandoned with an error log and no file is
    /// written; this is not reported as an `Err`.
    pub fn write_consumption_evolution(
        &mut self,
        evolution: &EvolutionMap,
        scope: Scope,
    ) -> Result<EvolutionExport> {
        let root = self.properties.evolution_root();

        for dir in Scope::ALL_SCOPES.map(|s| root.join(s.folder_name())) {
            if fs::create_dir_all(&dir).is_err() {
                error!(
                    "Cannot create {} folder. Methods consumption evolution cannot be reported.",
                    dir.display()
                );
                return Ok(EvolutionExport::FolderUnavailable(dir));
            }
        }

        let folder = root.join(scope.folder_name());
        for (method, series) in evolution {
            let name = folder.join(evolution_file_name(self.app_pid, method));
            let rows: Vec<(String, f64)> = series
                .iter()
                .map(|(timestamp, energy)| (timestamp.to_string(), *energy))
                .collect();
            self.write_dataset(&name, rows)?;
        }

        Ok(EvolutionExport::Written(evolution.len()))
    }

    fn write_dataset<K, I>(&mut self, name: &Path, rows: I) -> Result<()>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut target = Target::open(&mut self.writer, name, false)?;
        target.write_all(rows)?;
        target.close()?;
        self.files.push(name.to_path_buf());
        Ok(())
    }
}
