//! src/logging.rs
//! ============================================================================
//! # Logging: agent log line format and subscriber setup
//!
//! Every line has the layout
//! `dd/MM/yyyy hh:mm:ss.SSS - [LEVEL] - message`, in local time and on the
//! 12-hour clock, with the agent's level names (`SEVERE`, `WARNING`, `INFO`,
//! `FINE`, `FINEST`). Formatting holds no shared state, so any number of
//! threads can log at once.

use std::{fmt, fs, path::Path};

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{Event, Level, Subscriber, field::Field};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    field::Visit,
    fmt::{
        FmtContext,
        format::{FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::{
    config::AgentProperties,
    error::{Error, Result},
};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %I:%M:%S%.3f";

/// Level name as printed by the agent.
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "SEVERE",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "FINE",
        Level::TRACE => "FINEST",
    }
}

/// A log entry with its message already interpolated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Milliseconds since the Unix epoch
    pub millis: i64,
    pub level: Level,
    pub message: String,
}

impl LogRecord {
    pub fn new(millis: i64, level: Level, message: impl Into<String>) -> Self {
        Self {
            millis,
            level,
            message: message.into(),
        }
    }
}

/// Renders a record in local time.
pub fn format_record(record: &LogRecord) -> String {
    format_record_in(record, &Local)
}

/// Renders a record in the given time zone.
///
/// `millis` outside chrono's representable range renders as the Unix epoch.
pub fn format_record_in<Tz>(record: &LogRecord, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let stamp = DateTime::<Utc>::from_timestamp_millis(record.millis)
        .unwrap_or_default()
        .with_timezone(tz);
    let mut line = String::with_capacity(32 + record.message.len());
    let _ = write_line(&mut line, &stamp, &record.level, &record.message);
    line
}

fn write_line<W, Tz>(w: &mut W, stamp: &DateTime<Tz>, level: &Level, message: &str) -> fmt::Result
where
    W: fmt::Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    writeln!(
        w,
        "{} - [{}] - {}",
        stamp.format(TIMESTAMP_FORMAT),
        level_name(level),
        message
    )
}

/// Collects the `message` field and any extra fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            use fmt::Write as _;
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}

impl MessageVisitor {
    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        use fmt::Write as _;
        let _ = write!(self.fields, " {}={}", field.name(), value);
    }

    fn into_message(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

/// `tracing` event formatter producing the agent log layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoularFormatter;

impl<S, N> FormatEvent<S, N> for JoularFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        write_line(
            &mut w,
            &Local::now(),
            event.metadata().level(),
            &visitor.into_message(),
        )
    }
}

pub struct Logger;

impl Logger {
    /// Installs the global subscriber. Call **once** near the start of `main`.
    ///
    /// The returned guard flushes the log file on drop; keep it alive until exit.
    pub fn init(props: &AgentProperties) -> Result<Option<WorkerGuard>> {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .event_format(JoularFormatter)
            .with_writer(std::io::stderr)
            .with_ansi(false);

        let (file_layer, guard) = match &props.log_file {
            Some(path) => {
                let (writer, guard) = tracing_appender::non_blocking(open_appender(path)?);
                let layer = tracing_subscriber::fmt::layer()
                    .event_format(JoularFormatter)
                    .with_writer(writer)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter(&props.logger_level)?)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| Error::Logging(e.to_string()))?;

        Ok(guard)
    }
}

/// `RUST_LOG` when set, otherwise the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| Error::Logging(format!("invalid logger level '{level}': {e}"))),
    }
}

fn open_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Logging(format!("log file {} has no file name", path.display())))?;

    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    Ok(tracing_appender::rolling::never(dir, file_name))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Log capture for assertions on emitted lines.

    use super::JoularFormatter;
    use parking_lot::Mutex;
    use std::{io, sync::Arc};
    use tracing::subscriber::DefaultGuard;

    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        pub fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    /// Routes this thread's events through [`JoularFormatter`] into a buffer.
    pub fn capture() -> (CapturedLogs, DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(JoularFormatter)
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }
}
