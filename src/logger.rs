//! Structured logging handle built on `tracing`.
//!
//! A [`Logger`] is a cheap, cloneable value that is passed explicitly to the
//! components that log (the REST client, router middleware). It filters by
//! its own minimum level and attaches the service name and fixed fields to
//! every event. Installing the process-wide subscriber that actually writes
//! events is a separate, application-level step: [`init`].

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

/// Error returned when a logger cannot be built or installed.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("unrecognized level: {0:?}")]
    InvalidLevel(String),
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Severity of a log event, lowest first.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    /// Logged as an error; a library never terminates the process.
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    fn filter_directive(self) -> &'static str {
        match self {
            Self::Fatal => "error",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LoggerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(LoggerError::InvalidLevel(value.to_owned())),
        }
    }
}

/// Where [`init`] writes formatted events.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Output {
    #[default]
    Stdout,
    Stderr,
}

/// Logger configuration. The level is kept as text so that a bad value is
/// reported when the logger is built rather than when the config is read.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggerConfig {
    /// Minimum level; empty means `info`.
    pub level: String,
    /// Human-friendly output instead of JSON.
    pub development: bool,
    pub service_name: String,
    /// Fields attached to every event.
    pub initial_fields: BTreeMap<String, JsonValue>,
    /// Omit source file and line from formatted events.
    pub disable_caller: bool,
    /// Omit span context from formatted events.
    pub disable_stacktrace: bool,
    pub output: Output,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: String::new(),
            development: false,
            service_name: String::new(),
            initial_fields: BTreeMap::new(),
            disable_caller: false,
            disable_stacktrace: false,
            output: Output::Stdout,
        }
    }
}

impl LoggerConfig {
    /// Builds a config from an ordered list of options.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = LoggerOption>,
    {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }

    /// Parses the configured level; an empty level means `info`.
    pub fn parsed_level(&self) -> Result<Level, LoggerError> {
        if self.level.trim().is_empty() {
            Ok(Level::Info)
        } else {
            self.level.parse()
        }
    }
}

/// A single configuration step for [`LoggerConfig`].
#[derive(Clone, Debug, PartialEq)]
pub enum LoggerOption {
    Level(String),
    DevelopmentMode(bool),
    ServiceName(String),
    InitialFields(BTreeMap<String, JsonValue>),
    DisableCaller(bool),
    DisableStacktrace(bool),
    Output(Output),
}

impl LoggerOption {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Level(_) => "WithLevel",
            Self::DevelopmentMode(_) => "WithDevelopmentMode",
            Self::ServiceName(_) => "WithServiceName",
            Self::InitialFields(_) => "WithInitialFields",
            Self::DisableCaller(_) => "WithDisableCaller",
            Self::DisableStacktrace(_) => "WithDisableStacktrace",
            Self::Output(_) => "WithOutput",
        }
    }

    pub fn apply(self, config: &mut LoggerConfig) {
        match self {
            Self::Level(level) => config.level = level,
            Self::DevelopmentMode(on) => config.development = on,
            Self::ServiceName(name) => config.service_name = name,
            // Later values for the same key win.
            Self::InitialFields(fields) => config.initial_fields.extend(fields),
            Self::DisableCaller(on) => config.disable_caller = on,
            Self::DisableStacktrace(on) => config.disable_stacktrace = on,
            Self::Output(output) => config.output = output,
        }
    }
}

/// Cloneable logging handle.
///
/// Well-known fields (`component`, `request_id`, `method`, `path`,
/// `remote_addr`, `url`, `status`, `duration_ms`, `attempt`) are recorded as
/// typed event fields. Any other field is folded into a single `extra` JSON
/// object string, since `tracing` field names are fixed at compile time.
#[derive(Clone)]
pub struct Logger {
    min_level: Option<Level>,
    service: Arc<str>,
    fields: Arc<BTreeMap<String, JsonValue>>,
    recorded: Arc<EventFields>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.min_level)
            .field("service", &self.service)
            .field("fields", &self.fields)
            .finish()
    }
}

#[derive(Debug, Default)]
struct EventFields {
    component: Option<String>,
    request_id: Option<String>,
    method: Option<String>,
    path: Option<String>,
    remote_addr: Option<String>,
    url: Option<String>,
    status: Option<i64>,
    duration_ms: Option<i64>,
    attempt: Option<i64>,
    extra: Option<String>,
}

impl EventFields {
    fn from_map(fields: &BTreeMap<String, JsonValue>) -> Self {
        let mut recorded = Self::default();
        let mut extra = serde_json::Map::new();
        for (key, value) in fields {
            let stored = match value {
                JsonValue::String(text) => match recorded.text_slot(key) {
                    Some(slot) => {
                        *slot = Some(text.clone());
                        true
                    }
                    None => false,
                },
                JsonValue::Number(number) => match (recorded.number_slot(key), number.as_i64()) {
                    (Some(slot), Some(number)) => {
                        *slot = Some(number);
                        true
                    }
                    _ => false,
                },
                _ => false,
            };
            if !stored {
                extra.insert(key.clone(), value.clone());
            }
        }
        if !extra.is_empty() {
            recorded.extra = Some(JsonValue::Object(extra).to_string());
        }
        recorded
    }

    fn text_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "component" => Some(&mut self.component),
            "request_id" => Some(&mut self.request_id),
            "method" => Some(&mut self.method),
            "path" => Some(&mut self.path),
            "remote_addr" => Some(&mut self.remote_addr),
            "url" => Some(&mut self.url),
            _ => None,
        }
    }

    fn number_slot(&mut self, name: &str) -> Option<&mut Option<i64>> {
        match name {
            "status" => Some(&mut self.status),
            "duration_ms" => Some(&mut self.duration_ms),
            "attempt" => Some(&mut self.attempt),
            _ => None,
        }
    }
}

macro_rules! emit {
    ($macro:ident, $service:expr, $fields:expr, $message:expr) => {
        tracing::$macro!(
            service = $service,
            component = $fields.component.as_deref(),
            request_id = $fields.request_id.as_deref(),
            method = $fields.method.as_deref(),
            path = $fields.path.as_deref(),
            remote_addr = $fields.remote_addr.as_deref(),
            url = $fields.url.as_deref(),
            status = $fields.status,
            duration_ms = $fields.duration_ms,
            attempt = $fields.attempt,
            extra = $fields.extra.as_deref(),
            "{}",
            $message
        )
    };
}

impl Default for Logger {
    /// An `info` logger with no service name or fields.
    fn default() -> Self {
        Self::from_parts(Some(Level::Info), Arc::from(""), BTreeMap::new())
    }
}

impl Logger {
    /// Builds a logger, failing on an unrecognized level.
    pub fn new(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let level = config.parsed_level()?;
        Ok(Self::from_parts(
            Some(level),
            Arc::from(config.service_name.as_str()),
            config.initial_fields.clone(),
        ))
    }

    /// Builds a logger from options.
    pub fn with_options<I>(options: I) -> Result<Self, LoggerError>
    where
        I: IntoIterator<Item = LoggerOption>,
    {
        Self::new(&LoggerConfig::from_options(options))
    }

    /// A logger that discards everything.
    pub fn noop() -> Self {
        Self::from_parts(None, Arc::from(""), BTreeMap::new())
    }

    fn from_parts(
        min_level: Option<Level>,
        service: Arc<str>,
        fields: BTreeMap<String, JsonValue>,
    ) -> Self {
        let recorded = EventFields::from_map(&fields);
        Self {
            min_level,
            service,
            fields: Arc::new(fields),
            recorded: Arc::new(recorded),
        }
    }

    /// Returns a child logger with one more field.
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let mut fields = (*self.fields).clone();
        fields.insert(key.into(), value.into());
        Self::from_parts(self.min_level, self.service.clone(), fields)
    }

    /// Returns a child logger with the given fields merged in.
    pub fn with_fields<I, K>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        let mut fields = (*self.fields).clone();
        fields.extend(extra.into_iter().map(|(key, value)| (key.into(), value)));
        Self::from_parts(self.min_level, self.service.clone(), fields)
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn fields(&self) -> &BTreeMap<String, JsonValue> {
        &self.fields
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.min_level.is_some_and(|min| level >= min)
    }

    pub fn log(&self, level: Level, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let service = (!self.service.is_empty()).then_some(&*self.service);
        let fields = &*self.recorded;
        match level {
            Level::Debug => emit!(debug, service, fields, message),
            Level::Info => emit!(info, service, fields, message),
            Level::Warn => emit!(warn, service, fields, message),
            Level::Error | Level::Fatal => emit!(error, service, fields, message),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Installs the process-wide `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level when set.
/// Production mode writes JSON; development mode writes pretty text.
pub fn init(config: &LoggerConfig) -> Result<(), LoggerError> {
    let level = config.parsed_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));
    let with_caller = !config.disable_caller;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(with_caller)
        .with_line_number(with_caller)
        .with_target(with_caller);

    let result = match (config.development, config.output) {
        (true, Output::Stdout) => builder.pretty().with_writer(std::io::stdout).try_init(),
        (true, Output::Stderr) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (false, Output::Stdout) => builder
            .json()
            .with_current_span(!config.disable_stacktrace)
            .with_writer(std::io::stdout)
            .try_init(),
        (false, Output::Stderr) => builder
            .json()
            .with_current_span(!config.disable_stacktrace)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    result.map_err(|err| LoggerError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        io,
        sync::{Arc, Mutex},
    };

    use serde_json::{json, Value as JsonValue};

    use super::{Level, Logger, LoggerConfig, LoggerError, LoggerOption};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .expect("capture buffer mutex must not be poisoned")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("capture buffer").clone()).into_owned()
        }
    }

    #[test]
    fn default_config_builds_info_logger() {
        let logger = Logger::new(&LoggerConfig::default()).expect("default logger must build");
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = Logger::with_options([LoggerOption::Level("invalid".to_owned())])
            .expect_err("invalid level must fail");
        assert!(matches!(err, LoggerError::InvalidLevel(level) if level == "invalid"));
    }

    #[test]
    fn options_apply_in_order() {
        let mut first = BTreeMap::new();
        first.insert("key".to_owned(), json!("old"));
        let mut second = BTreeMap::new();
        second.insert("key".to_owned(), json!("new"));

        let config = LoggerConfig::from_options([
            LoggerOption::Level("warn".to_owned()),
            LoggerOption::Level("DEBUG".to_owned()),
            LoggerOption::DevelopmentMode(true),
            LoggerOption::ServiceName("orders".to_owned()),
            LoggerOption::InitialFields(first),
            LoggerOption::InitialFields(second),
            LoggerOption::DisableCaller(true),
        ]);

        assert_eq!(config.parsed_level().expect("level parses"), Level::Debug);
        assert!(config.development);
        assert!(config.disable_caller);
        assert!(!config.disable_stacktrace);
        assert_eq!(config.service_name, "orders");
        assert_eq!(config.initial_fields["key"], json!("new"));
        assert_eq!(LoggerOption::DisableStacktrace(true).name(), "WithDisableStacktrace");
    }

    #[test]
    fn noop_logger_is_never_enabled() {
        let logger = Logger::noop();
        assert!(!logger.enabled(Level::Fatal));
    }

    #[test]
    fn child_logger_keeps_parent_fields() {
        let logger = Logger::with_options([LoggerOption::ServiceName("svc".to_owned())])
            .expect("logger must build")
            .with_field("component", "client");
        let child = logger.with_fields([("attempt", json!(2))]);

        assert_eq!(child.service_name(), "svc");
        assert_eq!(child.fields()["component"], json!("client"));
        assert_eq!(child.fields()["attempt"], json!(2));
        assert!(!logger.fields().contains_key("attempt"));
    }

    #[test]
    fn events_carry_service_and_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        let logger = Logger::with_options([
            LoggerOption::Level("info".to_owned()),
            LoggerOption::ServiceName("billing".to_owned()),
        ])
        .expect("logger must build")
        .with_field("component", "client")
        .with_field("status", 503)
        .with_field("tenant", "acme");

        tracing::subscriber::with_default(subscriber, || {
            logger.debug("hidden");
            logger.info("hello");
        });

        let output = captured.text();
        assert!(!output.contains("hidden"));
        let event: JsonValue = serde_json::from_str(output.trim()).expect("one json event");
        let fields = &event["fields"];
        assert_eq!(fields["message"], "hello");
        assert_eq!(fields["service"], "billing");
        assert_eq!(fields["component"], "client");
        assert_eq!(fields["status"], 503);
        assert!(fields.get("request_id").is_none());
        let extra: JsonValue = serde_json::from_str(fields["extra"].as_str().expect("extra text"))
            .expect("extra is a json object");
        assert_eq!(extra, json!({"tenant": "acme"}));
    }
}
