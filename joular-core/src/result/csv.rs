//! CSV result writer: one `<target>.csv` file per dataset, one `key,value`
//! record per row.

use csv::{Writer, WriterBuilder};
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};
use tracing::debug;

use super::ResultWriter;
use crate::error::{Error, Result};

const EXTENSION: &str = "csv";

/// Writes datasets as headerless CSV files.
#[derive(Debug, Default)]
pub struct CsvResultWriter {
    current: Option<OpenTarget>,
}

#[derive(Debug)]
struct OpenTarget {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl CsvResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// File actually written for target `name`.
    pub fn file_path(name: &Path) -> PathBuf {
        let mut file_name = name.as_os_str().to_owned();
        file_name.push(".");
        file_name.push(EXTENSION);
        PathBuf::from(file_name)
    }
}

impl ResultWriter for CsvResultWriter {
    fn set_target(&mut self, name: &Path, append: bool) -> Result<()> {
        self.close_target()?;

        let path = Self::file_path(name);
        let file = OpenOptions::new()
            .create(true)
            .write(!append)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let writer = WriterBuilder::new().has_headers(false).from_writer(file);
        self.current = Some(OpenTarget {
            path,
            writer,
            rows: 0,
        });
        Ok(())
    }

    fn write(&mut self, key: &str, value: f64) -> Result<()> {
        let target = self.current.as_mut().ok_or(Error::NoTarget)?;
        target
            .writer
            .write_record([key, value.to_string().as_str()])
            .map_err(|e| Error::csv(&target.path, e))?;
        target.rows += 1;
        Ok(())
    }

    fn close_target(&mut self) -> Result<()> {
        let Some(mut target) = self.current.take() else {
            return Ok(());
        };
        target
            .writer
            .flush()
            .map_err(|e| Error::io(&target.path, e))?;
        debug!("Wrote {} rows to {}", target.rows, target.path.display());
        Ok(())
    }
}
