//! Monitoring resource released at the start of shutdown.

use crate::error::Result;

/// Handle on whatever the sampling layer holds open (sensor device, MSR file,
/// power-meter socket...).
pub trait MonitoringResource: Send {
    /// Releases the resource. Called once, before any report is written.
    fn close(&mut self) -> Result<()>;
}

/// Resource for runs with nothing to release, such as snapshot replays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResource;

impl MonitoringResource for NoopResource {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<F> MonitoringResource for F
where
    F: FnMut() -> Result<()> + Send,
{
    fn close(&mut self) -> Result<()> {
        self()
    }
}
