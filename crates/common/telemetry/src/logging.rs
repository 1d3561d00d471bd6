// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    env,
    io::IsTerminal,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use bon::Builder;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if the non-empty string is not a valid `T`.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Used when neither `LoggingOptions::level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Handle for changing the level filter after initialization.
///
/// Populated by [`init_global_logging`]; empty until then.
pub static RELOAD_HANDLE: OnceCell<tracing_subscriber::reload::Handle<filter::Targets, Registry>> =
    OnceCell::new();

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoggingError {
    #[snafu(display("invalid log level filter '{filter}'"))]
    InvalidFilter {
        filter: String,
        source: filter::ParseError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("initializing rolling file appender at {dir} failed"))]
    Appender {
        dir:    String,
        source: tracing_appender::rolling::InitError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to route `log` records into tracing"))]
    LogBridge {
        source: tracing_log::log::SetLoggerError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to install the global tracing subscriber"))]
    SetGlobal {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("logging has not been initialized"))]
    NotInitialized {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("failed to reload the log level filter"))]
    Reload {
        source: tracing_subscriber::reload::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Level filter such as `"info"` or `"info,spool_storage_queue=debug"`.
    ///
    /// Falls back to `RUST_LOG`, then to `"info"`.
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of hourly log files kept per sink.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Also write to the console when file logging is enabled.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,

    /// Send console output to stderr instead of stdout.
    #[default = false]
    #[builder(default)]
    pub use_stderr: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with span context.
    Json,

    /// Human-readable lines.
    #[default]
    Text,
}

/// Initialize logging for unit and integration tests.
///
/// Logs go to files under `UNITTEST_LOG_DIR` (default
/// `/tmp/__unittest_logs`) at `UNITTEST_LOG_LEVEL` (default `debug`). Safe to
/// call from every test; only the first call has an effect.
pub fn init_default_ut_logging() {
    static GUARDS: Lazy<Mutex<Option<Vec<WorkerGuard>>>> = Lazy::new(|| Mutex::new(None));

    let Ok(mut guards) = GUARDS.lock() else {
        return;
    };
    if guards.is_some() {
        return;
    }

    let dir = env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
    let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
    let opts = LoggingOptions {
        dir: dir.clone(),
        level: Some(level),
        append_stdout: false,
        ..Default::default()
    };

    match init_global_logging("unittest", &opts) {
        Ok(g) => {
            *guards = Some(g);
            tracing::info!("logs dir = {}", dir);
        }
        Err(e) => {
            // Another subscriber is already installed; tests still run.
            *guards = Some(Vec::new());
            eprintln!("unit test logging not installed: {e}");
        }
    }
}

/// Install the global subscriber.
///
/// Sets up a stdout layer (if `append_stdout` or no `dir`), an hourly rolling
/// file layer and an error-only rolling file layer (if `dir` is set), all
/// behind a reloadable target filter. Returns the non-blocking writer guards,
/// which must outlive the program's logging.
///
/// Only the first call installs anything; later calls return no guards.
pub fn init_global_logging(
    app_name: &str,
    opts: &LoggingOptions,
) -> Result<Vec<WorkerGuard>, LoggingError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(Vec::new());
    }

    let mut guards = vec![];

    let filter_str = opts
        .level
        .clone()
        .or_else(|| env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| DEFAULT_LOG_TARGETS.to_string());
    let filter = filter_str
        .parse::<filter::Targets>()
        .context(InvalidFilterSnafu { filter: &filter_str })?;

    let console_logging_layer = if !(opts.append_stdout || opts.dir.is_empty()) {
        None
    } else if opts.use_stderr {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);
        Some(fmt_layer(
            opts.log_format,
            writer,
            std::io::stderr().is_terminal(),
        ))
    } else {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);
        Some(fmt_layer(
            opts.log_format,
            writer,
            std::io::stdout().is_terminal(),
        ))
    };

    let (file_logging_layer, err_file_logging_layer) = if opts.dir.is_empty() {
        (None, None)
    } else {
        let (writer, guard) = tracing_appender::non_blocking(rolling_appender(app_name, opts)?);
        guards.push(guard);
        let file = fmt_layer(opts.log_format, writer, false);

        let (writer, guard) =
            tracing_appender::non_blocking(rolling_appender(&format!("{app_name}-err"), opts)?);
        guards.push(guard);
        let err = fmt_layer(opts.log_format, writer, false)
            .with_filter(filter::LevelFilter::ERROR);

        (Some(file), Some(err))
    };

    let (dyn_filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);

    let subscriber = Registry::default()
        .with(dyn_filter)
        .with(console_logging_layer)
        .with(file_logging_layer)
        .with(err_file_logging_layer);

    tracing::subscriber::set_global_default(subscriber).context(SetGlobalSnafu)?;
    // A `log` logger may already be installed by the host; tracing still works.
    if let Err(e) = LogTracer::init().context(LogBridgeSnafu) {
        tracing::debug!(error = %e, "log records are not bridged");
    }
    let _ = RELOAD_HANDLE.set(reload_handle);

    Ok(guards)
}

/// Replace the active level filter.
pub fn set_log_level(level: &str) -> Result<(), LoggingError> {
    let targets = level
        .parse::<filter::Targets>()
        .context(InvalidFilterSnafu { filter: level })?;
    RELOAD_HANDLE
        .get()
        .context(NotInitializedSnafu)?
        .reload(targets)
        .context(ReloadSnafu)
}

fn rolling_appender(
    prefix: &str,
    opts: &LoggingOptions,
) -> Result<RollingFileAppender, LoggingError> {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .context(AppenderSnafu { dir: &opts.dir })
}

fn fmt_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}
