//! Ordered processor chain turning tracing events into rendered lines.
//!
//! Every event flows through the same fixed sequence: the caller's own
//! message and fields form the base mapping, then level and logger name,
//! a microsecond UTC timestamp, exception info when present, and the
//! process-wide context fields are attached, in that order, before the
//! renderer selected at setup produces the final line. The console sink
//! always receives the rendered line; the optional file sink receives a
//! plain (non-ANSI) rendering of the same event.

use std::fmt::Write as _;
use std::io::Write as _;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::layer::{Context, Layer};

use crate::config::LogFormat;

/// Process-wide fields injected into every event.
#[derive(Debug, Clone)]
pub(crate) struct ContextFields {
    pub service: String,
    pub version: String,
    pub environment: String,
}

/// An ordered field-name → value mapping, immutable once rendered.
#[derive(Debug, Default)]
pub(crate) struct LogEvent {
    fields: Vec<(String, Value)>,
}

impl LogEvent {
    fn push(&mut self, key: &str, value: Value) {
        self.fields.push((key.to_string(), value));
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Raw material extracted from a tracing event before processing.
#[derive(Debug)]
pub(crate) struct RawEvent {
    pub level: String,
    pub logger: String,
    pub message: String,
    pub fields: Vec<(String, Value)>,
    pub error: Option<String>,
}

/// Runs the processor chain in its fixed order.
pub(crate) fn assemble(raw: RawEvent, context: &ContextFields, now: DateTime<Utc>) -> LogEvent {
    let mut event = LogEvent::default();

    // Base mapping: the log call's own message and fields.
    event.push("event", Value::String(raw.message));
    for (key, value) in raw.fields {
        event.fields.push((key, value));
    }

    attach_identity(&mut event, &raw.level, &raw.logger);
    attach_timestamp(&mut event, now);
    attach_exception(&mut event, raw.error);
    attach_context(&mut event, context);
    event
}

fn attach_identity(event: &mut LogEvent, level: &str, logger: &str) {
    event.push("level", Value::String(level.to_ascii_lowercase()));
    event.push("logger", Value::String(logger.to_string()));
}

fn attach_timestamp(event: &mut LogEvent, now: DateTime<Utc>) {
    event.push(
        "timestamp",
        Value::String(now.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
    );
}

fn attach_exception(event: &mut LogEvent, error: Option<String>) {
    if let Some(error) = error {
        event.push("exception", Value::String(error));
    }
}

fn attach_context(event: &mut LogEvent, context: &ContextFields) {
    event.push("service", Value::String(context.service.clone()));
    event.push("version", Value::String(context.version.clone()));
    event.push("environment", Value::String(context.environment.clone()));
}

/// Renders the event as one JSON line, preserving field order.
pub(crate) fn render_json(event: &LogEvent) -> String {
    let map: serde_json::Map<String, Value> = event
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::to_string(&Value::Object(map))
        .unwrap_or_else(|_| "{\"event\":\"unrenderable log event\"}".to_string())
}

/// Renders the event human-readably, optionally colorized by level.
pub(crate) fn render_text(event: &LogEvent, ansi: bool) -> String {
    let level = event
        .get("level")
        .and_then(Value::as_str)
        .unwrap_or("info")
        .to_ascii_uppercase();
    let timestamp = event
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let logger = event
        .get("logger")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = event.get("event").and_then(Value::as_str).unwrap_or_default();

    let mut line = String::new();
    if ansi {
        let _ = write!(
            line,
            "{timestamp} {}{level:>5}\x1b[0m {logger}: {message}",
            level_color(&level)
        );
    } else {
        let _ = write!(line, "{timestamp} {level:>5} {logger}: {message}");
    }

    for (key, value) in &event.fields {
        if matches!(key.as_str(), "event" | "level" | "logger" | "timestamp") {
            continue;
        }
        match value {
            Value::String(s) => {
                let _ = write!(line, " {key}={s}");
            }
            other => {
                let _ = write!(line, " {key}={other}");
            }
        }
    }
    line
}

fn level_color(level: &str) -> &'static str {
    match level {
        "ERROR" => "\x1b[31m",
        "WARN" => "\x1b[33m",
        "INFO" => "\x1b[32m",
        "DEBUG" => "\x1b[34m",
        _ => "\x1b[35m",
    }
}

/// Collects a tracing event's message and fields into JSON values.
#[derive(Debug, Default)]
struct FieldVisitor {
    message: String,
    error: Option<String>,
    fields: Vec<(String, Value)>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "error" | "exception" => self.error = Some(value.to_string()),
            name => self.fields.push((name.to_string(), Value::String(value.to_string()))),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), Value::from(value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), Value::from(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name().to_string(), Value::from(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), Value::from(value)));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.error = Some(value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            "message" => self.message = rendered,
            "error" | "exception" => self.error = Some(rendered),
            name => self.fields.push((name.to_string(), Value::String(rendered))),
        }
    }
}

/// `tracing_subscriber` layer driving the pipeline and both sinks.
pub(crate) struct PipelineLayer {
    context: ContextFields,
    format: LogFormat,
    file: Option<NonBlocking>,
}

impl PipelineLayer {
    pub(crate) fn new(
        context: ContextFields,
        format: LogFormat,
        file: Option<NonBlocking>,
    ) -> Self {
        Self {
            context,
            format,
            file,
        }
    }
}

impl std::fmt::Debug for PipelineLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayer")
            .field("context", &self.context)
            .field("format", &self.format)
            .field("file", &self.file.is_some())
            .finish()
    }
}

impl<S: Subscriber> Layer<S> for PipelineLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let raw = RawEvent {
            level: metadata.level().to_string(),
            logger: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
            error: visitor.error,
        };
        let assembled = assemble(raw, &self.context, Utc::now());

        let console_line = match self.format {
            LogFormat::Json => render_json(&assembled),
            LogFormat::Text => render_text(&assembled, true),
        };
        {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{console_line}");
        }

        if let Some(file) = &self.file {
            let file_line = match self.format {
                LogFormat::Json => console_line,
                LogFormat::Text => render_text(&assembled, false),
            };
            let mut writer = file.clone();
            let _ = writeln!(writer, "{file_line}");
        }
    }
}
