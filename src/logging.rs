//! Logging setup.
//!
//! Headless runs log to stderr so stdout stays clean for stage lines. The
//! interactive UI owns the terminal, so it logs to a file or not at all.
//! `RUST_LOG` overrides the configured level.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Disable logging entirely
    Off,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            // Off is filtered out by its directive.
            LogLevel::Error | LogLevel::Off => Level::ERROR,
        }
    }
}

impl From<u8> for LogLevel {
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogDestination {
    #[default]
    Stderr,
    /// Append to a file
    File(PathBuf),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub destination: LogDestination,
    pub with_timestamps: bool,
    /// Include the module path
    pub with_target: bool,
    /// Colour the output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            destination: LogDestination::Stderr,
            with_timestamps: true,
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_destination(mut self, destination: LogDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Configuration for a `-v` count; `quiet` wins and keeps only warnings.
    pub fn from_verbosity(verbosity: u8, quiet: bool) -> Self {
        let level = if quiet {
            LogLevel::Warn
        } else {
            LogLevel::from(verbosity)
        };
        Self::default().with_level(level)
    }

    /// The effective filter directive, ignoring `RUST_LOG`.
    fn directive(&self) -> &'static str {
        if self.destination == LogDestination::Disabled {
            LogLevel::Off.directive()
        } else {
            self.level.directive()
        }
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Fails only if the log file cannot be opened. A second call keeps the
/// subscriber that is already installed.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) if config.destination != LogDestination::Disabled => EnvFilter::from_default_env(),
        _ => EnvFilter::new(config.directive()),
    };

    let (writer, ansi) = match &config.destination {
        LogDestination::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        LogDestination::Stderr | LogDestination::Disabled => {
            (BoxMakeWriter::new(io::stderr), config.ansi)
        }
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.with_target);

    let installed = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };
    if installed.is_err() {
        tracing::debug!("logging already initialised");
    }
    Ok(())
}
