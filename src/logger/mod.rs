//! The logger kernel.
//!
//! A [`Logger`] writes one line per call, synchronously, to every configured
//! sink: the console, an optional remote TCP log server, and any extra
//! writers. `tracing` events from keel and its dependencies are rendered
//! the same way once [`get_logger`] has run.
//!
//! | Format | Line |
//! |---|---|
//! | `json` | `{"timestamp","level","app","git_revision","runtime_version","msg"}` |
//! | `text` | `<timestamp> <LEVEL> [<app>] <msg>` |
//!
//! Timestamps are RFC 3339 UTC with nanoseconds. Only JSON records carry the
//! build enrichment; text is the console shape for local runs.
//!
//! Two ways to obtain one:
//!
//! - [`get_logger`] builds the process-wide logger from the environment on
//!   first use and returns the same handle on every later call. Concurrent
//!   first callers block until the single initialization finishes.
//! - [`Logger::builder`] builds a private instance, for injection and tests.
//!
//! # Environment
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `LOG_LEVEL` | `error`, `warning`, `info`, `debug`, or `0`–`6` | `info` |
//! | `LOG_SERVER` | `host:port` of a remote log server | none |
//! | `LOG_FORMAT` | `json` or `text` | `json` |
//!
//! An unreachable `LOG_SERVER` is fatal for [`get_logger`]: the process exits
//! rather than run without its logs reaching the operator.
//!
//! ```rust,no_run
//! use keel::logger::{self, LogMessage};
//!
//! let log = logger::get_logger("orders");
//! log.info("service starting").unwrap();
//! logger::log(&LogMessage::warning("cache cold")).unwrap();
//! ```

mod build_info;
mod record;
mod sink;

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::fmt::format::DefaultFields;

use crate::error::Error;
use crate::request::Request;

pub use build_info::BuildInfo;
pub use sink::{MemorySink, Sinks};

use record::RecordFormat;

/// Minimum level when `LOG_LEVEL` is missing or unparseable.
pub const DEFAULT_LEVEL: LogLevel = LogLevel::Info;

// ── LogLevel ──────────────────────────────────────────────────────────────────

/// Record severity, ordered from most to least severe.
///
/// A logger at level `Info` emits `Error`, `Warning` and `Info` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error   => "ERROR",
            Self::Warning => "WARNING",
            Self::Info    => "INFO",
            Self::Debug   => "DEBUG",
        }
    }

    /// Parses `raw`, falling back to [`DEFAULT_LEVEL`].
    pub fn resolve(raw: Option<&str>) -> Self {
        raw.and_then(|r| r.parse().ok()).unwrap_or(DEFAULT_LEVEL)
    }

    fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Error   => tracing::Level::ERROR,
            Self::Warning => tracing::Level::WARN,
            Self::Info    => tracing::Level::INFO,
            Self::Debug   => tracing::Level::DEBUG,
        }
    }

    /// `TRACE` folds into `Debug`.
    fn from_tracing(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN  => Self::Warning,
            tracing::Level::INFO  => Self::Info,
            _                     => Self::Debug,
        }
    }
}

/// Accepts a symbolic name (case-insensitive) or a numeric level where
/// `0`–`2` are errors, `3` warnings, `4` info and `5`–`6` debug.
impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return match n {
                0..=2 => Ok(Self::Error),
                3     => Ok(Self::Warning),
                4     => Ok(Self::Info),
                5 | 6 => Ok(Self::Debug),
                _     => Err(invalid_level(s)),
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "panic" | "fatal" | "error" => Ok(Self::Error),
            "warn" | "warning"          => Ok(Self::Warning),
            "info"                      => Ok(Self::Info),
            "debug" | "trace"           => Ok(Self::Debug),
            _                           => Err(invalid_level(s)),
        }
    }
}

fn invalid_level(raw: &str) -> Error {
    Error::Configuration { var: "LOG_LEVEL", reason: format!("unknown level `{raw}`") }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── LogFormat ─────────────────────────────────────────────────────────────────

/// Shape of kernel records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line with the enrichment fields.
    #[default]
    Json,
    /// `<timestamp> <LEVEL> [<app>] <message>`.
    Text,
}

impl LogFormat {
    /// `text` or `pretty` select text; anything else is JSON.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Self::Text,
            _ => Self::Json,
        }
    }
}

// ── LogMessage ────────────────────────────────────────────────────────────────

/// One record to be logged, optionally tied to the request being served.
///
/// With a request attached the line reads
/// `[<method>] '<url>' {<field=value ...>} - <text>`, where the fields are the
/// request's url-encoded form body.
pub struct LogMessage<'a> {
    pub level: LogLevel,
    pub text: String,
    pub request: Option<&'a Request>,
}

impl<'a> LogMessage<'a> {
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self { level, text: text.into(), request: None }
    }

    pub fn error(text: impl Into<String>) -> Self { Self::new(LogLevel::Error, text) }
    pub fn warning(text: impl Into<String>) -> Self { Self::new(LogLevel::Warning, text) }
    pub fn info(text: impl Into<String>) -> Self { Self::new(LogLevel::Info, text) }
    pub fn debug(text: impl Into<String>) -> Self { Self::new(LogLevel::Debug, text) }

    pub fn with_request(mut self, req: &'a Request) -> Self {
        self.request = Some(req);
        self
    }

    /// The message text with the request prefix folded in.
    pub fn render(&self) -> String {
        let Some(req) = self.request else {
            return self.text.clone();
        };
        let form = req.post_form()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("[{}] '{}' {{{}}} - {}", req.method(), req.uri(), form, self.text)
    }
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// A structured logger. Immutable once built; share it behind an `Arc`.
pub struct Logger {
    level: LogLevel,
    records: RecordFormat,
    sinks: Sinks,
}

impl Logger {
    pub fn builder(app: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(app)
    }

    pub fn app(&self) -> &str { &self.records.app }
    pub fn level(&self) -> LogLevel { self.level }
    pub fn format(&self) -> LogFormat { self.records.format }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    /// Writes `message` to every sink, or does nothing if its level is
    /// filtered out. A failing sink fails the call.
    pub fn log(&self, message: &LogMessage<'_>) -> Result<(), Error> {
        if !self.enabled(message.level) {
            return Ok(());
        }
        let line = self.records.render(message.level, &message.render())?;
        self.sinks.write_line(&line)?;
        Ok(())
    }

    pub fn error(&self, text: &str) -> Result<(), Error> { self.log(&LogMessage::error(text)) }
    pub fn warning(&self, text: &str) -> Result<(), Error> { self.log(&LogMessage::warning(text)) }
    pub fn info(&self, text: &str) -> Result<(), Error> { self.log(&LogMessage::info(text)) }
    pub fn debug(&self, text: &str) -> Result<(), Error> { self.log(&LogMessage::debug(text)) }

    /// Writes a preformatted access-log line as is, bypassing level and format.
    pub fn access(&self, line: &str) -> Result<(), Error> {
        self.sinks.write_line(line)?;
        Ok(())
    }

    /// Routes the process's `tracing` events (keel's own diagnostics and those
    /// of dependencies) into this logger's sinks, rendered exactly like
    /// kernel records. Returns `false` if another subscriber is already
    /// installed.
    pub fn install_tracing(&self) -> bool {
        self.subscriber_builder().try_init().is_ok()
    }

    fn subscriber_builder(&self) -> SubscriberBuilder<DefaultFields, RecordFormat, LevelFilter, Sinks> {
        tracing_subscriber::fmt()
            .with_writer(self.sinks.clone())
            .with_max_level(self.level.as_tracing())
            .with_ansi(false)
            .event_format(self.records.clone())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("app", &self.records.app)
            .field("level", &self.level)
            .field("format", &self.records.format)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

// ── LoggerBuilder ─────────────────────────────────────────────────────────────

/// Configures and builds a [`Logger`].
pub struct LoggerBuilder {
    app: String,
    level: LogLevel,
    format: LogFormat,
    remote: Option<String>,
    console: bool,
    extra: Vec<Box<dyn Write + Send>>,
}

impl LoggerBuilder {
    fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            level: DEFAULT_LEVEL,
            format: LogFormat::default(),
            remote: None,
            console: true,
            extra: Vec::new(),
        }
    }

    /// Reads `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SERVER`.
    pub fn from_env(app: impl Into<String>) -> Self {
        Self::from_lookup(app, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(app: impl Into<String>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut builder = Self::new(app).level(LogLevel::resolve(lookup("LOG_LEVEL").as_deref()));
        if let Some(format) = lookup("LOG_FORMAT") {
            builder = builder.format(LogFormat::parse(&format));
        }
        builder.remote = lookup("LOG_SERVER").filter(|addr| !addr.trim().is_empty());
        builder
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn remote(mut self, addr: impl Into<String>) -> Self {
        self.remote = Some(addr.into());
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }

    /// Adds a writer after the console and remote sinks.
    pub fn sink(mut self, writer: impl Write + Send + 'static) -> Self {
        self.extra.push(Box::new(writer));
        self
    }

    /// Opens every sink. Fails with [`Error::LoggerInit`] if the remote log
    /// server cannot be reached.
    pub fn build(self) -> Result<Logger, Error> {
        let sinks = Sinks::new();
        if self.console {
            sinks.push(io::stdout())?;
        }
        if let Some(addr) = &self.remote {
            sinks.push(Sinks::connect(addr.trim())?)?;
        }
        for writer in self.extra {
            sinks.push(writer)?;
        }
        Ok(Logger {
            level: self.level,
            records: RecordFormat { app: self.app, format: self.format, build: BuildInfo::current() },
            sinks,
        })
    }
}

// ── Process-wide logger ───────────────────────────────────────────────────────

static GLOBAL: OnceCell<Arc<Logger>> = OnceCell::new();

/// Returns the process-wide logger, building it from the environment on the
/// first call.
///
/// `app` only matters on that first call. Every caller, concurrent or not,
/// receives the same handle. The first call also installs the logger as the
/// process's `tracing` subscriber.
///
/// If `LOG_SERVER` is set but unreachable, the error is printed to stderr and
/// the process exits with status 1.
pub fn get_logger(app: &str) -> Arc<Logger> {
    let logger = GLOBAL.get_or_init(|| match LoggerBuilder::from_env(app).build() {
        Ok(logger) => {
            logger.install_tracing();
            tracing::debug!(app, level = %logger.level, "logger initialized");
            Arc::new(logger)
        }
        Err(err) => {
            eprintln!("keel: logger initialization failed: {err}");
            std::process::exit(1);
        }
    });
    Arc::clone(logger)
}

/// The process-wide logger, if [`get_logger`] has run.
pub fn global() -> Option<Arc<Logger>> {
    GLOBAL.get().cloned()
}

/// Logs through the process-wide logger.
///
/// # Panics
///
/// Panics if [`get_logger`] has not been called yet. Records are never
/// dropped silently.
pub fn log(message: &LogMessage<'_>) -> Result<(), Error> {
    match GLOBAL.get() {
        Some(logger) => logger.log(message),
        None => panic!("keel::logger::log called before get_logger initialized the process logger"),
    }
}
