use std::env::current_dir;
use std::path::Path;

use eyre::Result;
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use ansi_term::Colour::{Blue, Cyan, Purple, Red, Yellow};

use crate::config::{LogFormat, LoggingConfig};

/// Prefix of rolling log file names
pub const LOG_FILE_NAME_PREFIX: &str = "zerog-exporter.log";

/// Rotation used when none or an unknown one is configured
pub const DEFAULT_ROTATION: Rotation = Rotation::DAILY;

/// Configure logging telemetry.
///
/// `RUST_LOG` takes precedence over the configured level; `verbose` forces
/// debug. When a log directory is configured the returned guard must be kept
/// alive to flush the file writer.
pub fn init(verbose: bool, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zerog_exporter={level}")));

    let (ansi_layer, json_layer) = match config.format {
        LogFormat::Text => (Some(AnsiTermLayer), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    let (file_writer, guard) = match &config.directory {
        Some(directory) => {
            let appender = get_rolling_file_appender(directory, &config.rotation)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    Registry::default()
        .with(env_filter)
        .with(ansi_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to set subscriber: {}", e))?;

    Ok(guard)
}

/// Builds a rolling file appender in `directory`.
pub fn get_rolling_file_appender(directory: &Path, rotation: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(get_rotation_strategy(rotation))
        .filename_prefix(LOG_FILE_NAME_PREFIX)
        .build(directory)
        .map_err(|e| eyre::eyre!("Failed to create log file in {}: {}", directory.display(), e))
}

/// Parses a rotation name, falling back to [DEFAULT_ROTATION].
pub fn get_rotation_strategy(rotation: &str) -> Rotation {
    match rotation.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        "never" => Rotation::NEVER,
        _ => DEFAULT_ROTATION,
    }
}

/// Collects an event's message and fields into one line.
#[derive(Debug, Default)]
pub struct AnsiVisitor {
    message: String,
    fields: Vec<String>,
}

impl AnsiVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    /// Renders the message followed by `key=value` pairs.
    pub fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        format!("{} {}", self.message, self.fields.join(" "))
    }
}

impl Visit for AnsiVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string())
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, value.to_string())
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"))
    }
}

/// An Ansi Term layer for tracing
#[derive(Debug)]
pub struct AnsiTermLayer;

impl<S> Layer<S> for AnsiTermLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let utc: chrono::DateTime<chrono::Utc> = chrono::Utc::now();

        let level = match *metadata.level() {
            Level::ERROR => Red.paint("ERROR"),
            Level::WARN => Yellow.paint("WARN"),
            Level::INFO => Blue.paint("INFO"),
            Level::DEBUG => ansi_term::Style::new().paint("DEBUG"),
            Level::TRACE => Purple.paint("TRACE"),
        };

        let file = metadata.file().unwrap_or_default();
        let relative_path = current_dir().unwrap_or_default().to_string_lossy().to_string();
        let file = file
            .strip_prefix(&relative_path)
            .map(|f| f.trim_start_matches('/'))
            .unwrap_or(file);
        let location = match metadata.line() {
            Some(line) => format!("./{file}:{line}"),
            None => format!("./{file}"),
        };

        let mut visitor = AnsiVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "[{}] {}: {} at {} {}",
            Cyan.paint(utc.to_rfc2822()),
            level,
            Purple.paint(metadata.target()),
            Cyan.paint(location),
            visitor.finish()
        );

        if *metadata.level() == Level::ERROR {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}
