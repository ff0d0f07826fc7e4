//! Record rendering, shared by kernel calls and `tracing` events.

use std::fmt::{self, Write as _};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use super::{BuildInfo, LogFormat, LogLevel};
use crate::error::Error;

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    level: LogLevel,
    app: &'a str,
    git_revision: &'a str,
    runtime_version: &'a str,
    msg: &'a str,
}

/// Turns a level and a message into one output line.
#[derive(Clone, Debug)]
pub(super) struct RecordFormat {
    pub(super) app: String,
    pub(super) format: LogFormat,
    pub(super) build: &'static BuildInfo,
}

impl RecordFormat {
    pub(super) fn render(&self, level: LogLevel, msg: &str) -> Result<String, Error> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        match self.format {
            LogFormat::Text => Ok(format!("{timestamp} {level} [{}] {msg}", self.app)),
            LogFormat::Json => Ok(serde_json::to_string(&Record {
                timestamp,
                level,
                app: &self.app,
                git_revision: &self.build.git_revision,
                runtime_version: &self.build.runtime_version,
                msg,
            })?),
        }
    }
}

/// `tracing` events get the same shape as kernel records. The event's
/// message comes first, its other fields follow as `key=value`.
impl<S, N> FormatEvent<S, N> for RecordFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut text = EventText::default();
        event.record(&mut text);
        let level = LogLevel::from_tracing(*event.metadata().level());
        let line = self.render(level, &text.finish()).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

#[derive(Default)]
struct EventText {
    message: String,
    fields: String,
}

impl EventText {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
