//! Console and JSON log formatting.
//!
//! Spans opened by the queue workers carry a `q` field with the queue name; the
//! pretty formatter shows it in its own column and the JSON formatter merges it
//! into `fields`.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "publisher=info";

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[90m";
const TIMESTAMP: &str = "\x1b[96m";
const COLUMN: &str = "\x1b[92m";
const MESSAGE: &str = "\x1b[97m";

/// Fields recorded on a span, kept in the span extensions
#[derive(Debug, Clone, Default)]
pub struct SpanFields(pub HashMap<String, String>);

struct SpanFieldVisitor<'a>(&'a mut SpanFields);

impl Visit for SpanFieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0 .0.insert(field.name().to_string(), format!("{:?}", value).trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0 .0.insert(field.name().to_string(), value.to_string());
    }
}

/// Collects span fields so the formatters can read them back
pub struct FieldCollectorLayer;

impl<S> Layer<S> for FieldCollectorLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &tracing::span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = SpanFields::default();
        attrs.record(&mut SpanFieldVisitor(&mut fields));
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        let mut fields = extensions.remove::<SpanFields>().unwrap_or_default();
        values.record(&mut SpanFieldVisitor(&mut fields));
        extensions.insert(fields);
    }
}

/// Span fields of the current span and its parents, innermost wins
fn collect_span_fields<S, N>(ctx: &FmtContext<'_, S, N>) -> HashMap<String, String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let mut collected = HashMap::new();
    if let Some(scope) = ctx.event_scope() {
        for span in scope.from_root() {
            if let Some(fields) = span.extensions().get::<SpanFields>() {
                collected.extend(fields.0.clone());
            }
        }
    }
    collected
}

#[derive(Default)]
struct PrettyVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for PrettyVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value = format!("{:?}", value).trim_matches('"').to_string();
        match field.name() {
            "message" => self.message = value,
            // shown in the queue column
            "q" => {}
            // ids first
            "id" => self.fields.insert(0, format!("{}id={}{}", DIM, value, RESET)),
            name => self.fields.push(format!("{}{}={}{}", DIM, name, value, RESET)),
        }
    }
}

/// Column layout for terminals: `timestamp | level | queue | service | message (fields)`
pub struct PrettyFormatter;

impl<S, N> FormatEvent<S, N> for PrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let level_color = match *meta.level() {
            Level::TRACE => "\x1b[90m",
            Level::DEBUG => "\x1b[34m",
            Level::INFO => "\x1b[32m",
            Level::WARN => "\x1b[33m",
            Level::ERROR => "\x1b[31m",
        };
        let queue = collect_span_fields(ctx).get("q").map(|q| queue_column(q)).unwrap_or_else(|| "-".to_string());

        let mut visitor = PrettyVisitor::default();
        event.record(&mut visitor);

        write!(writer, "{}{}{} {}|{} ", TIMESTAMP, Utc::now().format("%y-%m-%d %H:%M:%S"), RESET, DIM, RESET)?;
        write!(writer, "{}{:<5}{} {}|{} ", level_color, meta.level(), RESET, DIM, RESET)?;
        write!(writer, "{}{:<12}{} {}|{} ", COLUMN, queue, RESET, DIM, RESET)?;
        write!(writer, "{}{:<11}{} {}|{} ", COLUMN, extract_service_name(meta.target()), RESET, DIM, RESET)?;
        write!(writer, "{}{}{}", MESSAGE, visitor.message, RESET)?;
        if !visitor.fields.is_empty() {
            write!(writer, " ({})", visitor.fields.join(", "))?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value = format!("{:?}", value).trim_matches('"').to_string();
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}

/// One JSON object per line, for log aggregation
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut root = Map::new();
        root.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)));
        root.insert("level".into(), Value::String(meta.level().to_string()));
        root.insert("target".into(), Value::String(meta.target().to_string()));
        root.insert("service".into(), Value::String(extract_service_name(meta.target()).to_string()));
        if let Some(line) = meta.line() {
            root.insert("line_number".into(), Value::from(line));
        }
        if let Some(message) = visitor.message.take() {
            root.insert("message".into(), Value::String(message));
        }

        let mut fields = visitor.fields;
        for (key, value) in collect_span_fields(ctx) {
            fields.entry(key).or_insert(Value::String(value));
        }
        if !fields.is_empty() {
            root.insert("fields".into(), Value::Object(fields));
        }

        let mut line = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        line.push('\n');
        writer.write_str(&line)
    }
}

/// Installs color_eyre and the global subscriber.
///
/// `RUST_LOG` selects the filter (default `publisher=info`), `LOG_FORMAT=json`
/// switches to [`JsonEventFormatter`].
pub fn init_logging() {
    color_eyre::install().expect("Unable to install color_eyre");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .parse(DEFAULT_FILTER)
            .expect("Invalid default filter directive")
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let json_layer = json.then(|| fmt::layer().event_format(JsonEventFormatter));
    let pretty_layer = (!json).then(|| fmt::layer().event_format(PrettyFormatter));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(FieldCollectorLayer)
        .with(json_layer)
        .with(pretty_layer)
        .with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global default subscriber");
}

/// Short service column for a tracing target
fn extract_service_name(target: &str) -> &'static str {
    if target.starts_with("publisher_gateway_chain_client") {
        "GATEWAY"
    } else if target.starts_with("publisher_chain_client_interface") {
        "CHAIN_IFACE"
    } else if target.starts_with("publisher") {
        "-"
    } else {
        "EXTERNAL"
    }
}

/// `broadcastQueue` is shown as `BROADCAST`
pub fn queue_column(queue: &str) -> String {
    let name = queue.strip_suffix("Queue").unwrap_or(queue);
    let mut column = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_uppercase() && !column.is_empty() {
            column.push('_');
        }
        column.push(c.to_ascii_uppercase());
    }
    column
}
