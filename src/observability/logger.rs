//! Structured JSON access logger.
//!
//! # Responsibilities
//! - Emit one JSON object per line for each log entry
//! - Stamp every entry with `@time`, `level` and `service_name`
//! - Let callers compose fields before emitting
//!
//! # Design Decisions
//! - Each record is serialized fully and handed to the writer in a single
//!   `write_all`, so concurrent requests never interleave within a line
//! - Output goes through a `tracing_subscriber` `MakeWriter`, stdout by
//!   default
//! - Empty string fields are dropped from the record
//! - This logger is the access-log sink; crate diagnostics go through
//!   `tracing` (see [`logging`](super::logging))

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Key of the record timestamp.
pub const TIME_KEY: &str = "@time";
pub const LEVEL_KEY: &str = "level";
pub const SERVICE_NAME_KEY: &str = "service_name";
pub const MESSAGE_KEY: &str = "msg";
pub const TRANSACTION_ID_KEY: &str = "transaction_id";
pub const UUID_KEY: &str = "uuid";

struct LoggerInner {
    service_name: String,
    level: Level,
    writer: BoxMakeWriter,
}

/// Cheaply cloneable handle to a JSON line logger.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("service_name", &self.inner.service_name)
            .field("level", &self.inner.level)
            .finish()
    }
}

impl Logger {
    /// Logger writing to stdout, emitting entries at `level` or more severe.
    pub fn new(service_name: impl Into<String>, level: Level) -> Self {
        Self::with_writer(service_name, level, std::io::stdout)
    }

    /// Logger writing to the given writer factory.
    pub fn with_writer<W>(service_name: impl Into<String>, level: Level, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(LoggerInner {
                service_name: service_name.into(),
                level,
                writer: BoxMakeWriter::new(writer),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn level(&self) -> Level {
        self.inner.level
    }

    /// Whether entries at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.inner.level
    }

    /// Start an entry with no fields.
    pub fn entry(&self) -> Entry {
        Entry {
            logger: self.clone(),
            fields: Map::new(),
        }
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Serialize) -> Entry {
        self.entry().with_field(key, value)
    }

    pub fn with_fields<I, K>(&self, fields: I) -> Entry
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.entry().with_fields(fields)
    }

    pub fn with_transaction_id(&self, transaction_id: &str) -> Entry {
        self.entry().with_transaction_id(transaction_id)
    }

    fn emit(&self, level: Level, fields: Map<String, Value>, msg: &str) {
        if !self.enabled(level) {
            return;
        }

        let mut record: Map<String, Value> = fields
            .into_iter()
            .filter(|(_, value)| !matches!(value, Value::String(s) if s.is_empty()))
            .collect();
        record.insert(
            TIME_KEY.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        );
        record.insert(LEVEL_KEY.to_string(), Value::String(level_name(level).to_string()));
        record.insert(
            SERVICE_NAME_KEY.to_string(),
            Value::String(self.inner.service_name.clone()),
        );
        if !msg.is_empty() {
            record.insert(MESSAGE_KEY.to_string(), Value::String(msg.to_string()));
        }

        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize log entry");
                return;
            }
        };
        line.push(b'\n');

        let mut writer = self.inner.writer.make_writer();
        if let Err(err) = writer.write_all(&line) {
            tracing::warn!(error = %err, "Failed to write log entry");
        }
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warning",
        _ => "error",
    }
}

/// A log entry under construction.
#[must_use = "an entry is only written by one of its level methods"]
#[derive(Debug, Clone)]
pub struct Entry {
    logger: Logger,
    fields: Map<String, Value>,
}

impl Entry {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|err| Value::String(format!("unserializable field: {err}")));
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_fields<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in fields {
            self.fields.insert(key.into(), value);
        }
        self
    }

    /// Merge the fields of a serializable struct or map.
    pub fn with_serialized<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => self.fields.extend(fields),
            Ok(other) => {
                tracing::warn!(kind = json_kind(&other), "Ignoring non-object log fields");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize log fields");
            }
        }
        self
    }

    pub fn with_transaction_id(self, transaction_id: &str) -> Self {
        self.with_field(TRANSACTION_ID_KEY, transaction_id)
    }

    pub fn with_uuid(self, uuid: &str) -> Self {
        self.with_field(UUID_KEY, uuid)
    }

    pub fn debug(self, msg: &str) {
        self.logger.emit(Level::DEBUG, self.fields, msg);
    }

    pub fn info(self, msg: &str) {
        self.logger.emit(Level::INFO, self.fields, msg);
    }

    pub fn warn(self, msg: &str) {
        self.logger.emit(Level::WARN, self.fields, msg);
    }

    pub fn error(self, msg: &str) {
        self.logger.emit(Level::ERROR, self.fields, msg);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}


#[cfg(test)]
mod tests {
    use super::capture::CapturedLogs;
    use super::*;
    use serde_json::json;

    fn logger(level: Level) -> (Logger, CapturedLogs) {
        let logs = CapturedLogs::default();
        (Logger::with_writer("test-service", level, logs.clone()), logs)
    }

    #[test]
    fn test_entry_is_one_json_line() {
        let (log, logs) = logger(Level::INFO);
        log.with_field("status", 200)
            .with_field("method", "GET")
            .info("done");

        assert_eq!(logs.text().matches('\n').count(), 1);
        let records = logs.records();
        let record = &records[0];
        assert_eq!(record["status"], 200);
        assert_eq!(record["method"], "GET");
        assert_eq!(record["level"], "info");
        assert_eq!(record["service_name"], "test-service");
        assert_eq!(record["msg"], "done");
        assert!(record["@time"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_time_is_rfc3339() {
        let (log, logs) = logger(Level::INFO);
        log.entry().info("");
        let records = logs.records();
        let time = records[0]["@time"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[test]
    fn test_empty_message_and_strings_are_dropped() {
        let (log, logs) = logger(Level::INFO);
        log.with_field("username", "")
            .with_field("size", 0)
            .info("");

        let records = logs.records();
        let record = records[0].as_object().unwrap();
        assert!(!record.contains_key("username"));
        assert!(!record.contains_key("msg"));
        assert_eq!(record["size"], 0);
    }

    #[test]
    fn test_level_filtering() {
        let (log, logs) = logger(Level::WARN);
        log.entry().info("hidden");
        log.entry().debug("hidden");
        log.entry().warn("shown");
        log.entry().error("shown too");

        let records = logs.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["level"], "warning");
        assert_eq!(records[1]["level"], "error");
        assert!(log.enabled(Level::ERROR));
        assert!(!log.enabled(Level::INFO));
    }

    #[test]
    fn test_serialized_struct_and_helpers() {
        #[derive(Serialize)]
        struct Fields {
            method: &'static str,
            #[serde(rename = "userAgent")]
            user_agent: &'static str,
        }

        let (log, logs) = logger(Level::DEBUG);
        log.with_transaction_id("tid_abc")
            .with_serialized(&Fields {
                method: "POST",
                user_agent: "curl/8",
            })
            .with_uuid("a,b")
            .with_fields([("extra", json!({"nested": true}))])
            .debug("");

        let records = logs.records();
        let record = &records[0];
        assert_eq!(record["transaction_id"], "tid_abc");
        assert_eq!(record["method"], "POST");
        assert_eq!(record["userAgent"], "curl/8");
        assert_eq!(record["uuid"], "a,b");
        assert_eq!(record["extra"]["nested"], true);
        assert_eq!(record["level"], "debug");
    }

    #[test]
    fn test_non_object_serialized_is_ignored() {
        let (log, logs) = logger(Level::INFO);
        log.entry().with_serialized(&42).info("x");
        let records = logs.records();
        assert_eq!(records[0].as_object().unwrap().len(), 4);
    }
}
