//! Result sink: persists named datasets of `(key, value)` rows.
//!
//! A writer has a single target slot. Callers go through [`Target`], which
//! frames each dataset as open → write rows → close and closes the target on
//! every exit path, including early returns on error.

pub mod csv;
pub use self::csv::CsvResultWriter;

use std::path::Path;
use tracing::warn;

use crate::error::Result;

/// Line-oriented dataset writer.
pub trait ResultWriter {
    /// Opens `name` as the current target, finalizing any target still open.
    /// Truncates unless `append` is set.
    fn set_target(&mut self, name: &Path, append: bool) -> Result<()>;

    /// Writes one row to the current target.
    fn write(&mut self, key: &str, value: f64) -> Result<()>;

    /// Flushes and releases the current target. No-op when nothing is open.
    fn close_target(&mut self) -> Result<()>;
}

/// Open target borrowed from a [`ResultWriter`].
///
/// Dropping an unclosed target closes it; a failure at that point can only be
/// logged, so call [`Target::close`] when the outcome matters.
pub struct Target<'w, W: ResultWriter + ?Sized> {
    writer: &'w mut W,
    open: bool,
}

impl<'w, W: ResultWriter + ?Sized> Target<'w, W> {
    pub fn open(writer: &'w mut W, name: &Path, append: bool) -> Result<Self> {
        writer.set_target(name, append)?;
        Ok(Self { writer, open: true })
    }

    pub fn write(&mut self, key: &str, value: f64) -> Result<()> {
        self.writer.write(key, value)
    }

    /// Writes every `(key, value)` pair in iteration order.
    pub fn write_all<K, I>(&mut self, rows: I) -> Result<()>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        for (key, value) in rows {
            self.writer.write(key.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.writer.close_target()
    }
}

impl<W: ResultWriter + ?Sized> Drop for Target<'_, W> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.writer.close_target() {
                warn!("Failed to close result target: {e}");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory writers shared by the unit tests.

    use super::*;
    use crate::error::Error;
    use std::{io, path::PathBuf};

    /// Records every dataset in memory.
    #[derive(Debug, Default)]
    pub struct MemoryResultWriter {
        pub datasets: Vec<(PathBuf, Vec<(String, f64)>)>,
        pub closed: Vec<PathBuf>,
        current: Option<usize>,
    }

    impl MemoryResultWriter {
        pub fn rows(&self, name: &Path) -> Option<&[(String, f64)]> {
            self.datasets
                .iter()
                .rev()
                .find(|(path, _)| path == name)
                .map(|(_, rows)| rows.as_slice())
        }

        pub fn is_open(&self) -> bool {
            self.current.is_some()
        }
    }

    impl ResultWriter for MemoryResultWriter {
        fn set_target(&mut self, name: &Path, _append: bool) -> Result<()> {
            self.close_target()?;
            self.datasets.push((name.to_path_buf(), Vec::new()));
            self.current = Some(self.datasets.len() - 1);
            Ok(())
        }

        fn write(&mut self, key: &str, value: f64) -> Result<()> {
            let index = self.current.ok_or(Error::NoTarget)?;
            self.datasets[index].1.push((key.to_owned(), value));
            Ok(())
        }

        fn close_target(&mut self) -> Result<()> {
            if let Some(index) = self.current.take() {
                self.closed.push(self.datasets[index].0.clone());
            }
            Ok(())
        }
    }

    /// Delegates to a [`MemoryResultWriter`] but refuses targets whose file
    /// name contains `fail_on`.
    #[derive(Debug, Default)]
    pub struct FailingResultWriter {
        pub inner: MemoryResultWriter,
        pub fail_on: String,
    }

    impl FailingResultWriter {
        pub fn new(fail_on: &str) -> Self {
            Self {
                inner: MemoryResultWriter::default(),
                fail_on: fail_on.to_owned(),
            }
        }
    }

    impl ResultWriter for FailingResultWriter {
        fn set_target(&mut self, name: &Path, append: bool) -> Result<()> {
            if name.to_string_lossy().contains(&self.fail_on) {
                return Err(Error::io(
                    name,
                    io::Error::new(io::ErrorKind::StorageFull, "no space left on device"),
                ));
            }
            self.inner.set_target(name, append)
        }

        fn write(&mut self, key: &str, value: f64) -> Result<()> {
            self.inner.write(key, value)
        }

        fn close_target(&mut self) -> Result<()> {
            self.inner.close_target()
        }
    }
}
