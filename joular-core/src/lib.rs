pub mod error;

pub mod config;

pub mod logging;
pub use logging::{JoularFormatter, LogRecord, Logger};

pub mod monitor;

pub mod result;

pub mod shutdown;
pub use shutdown::{Scope, ShutdownHandler, ShutdownReport, StepOutcome};

pub mod status;
pub use status::{MeasurementSnapshot, MonitoringStatus};

pub use error::{Error, Result};
