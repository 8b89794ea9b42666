//! Minimal stderr logger.
//!
//! Records are printed as `[elapsed LEVEL module] message`, where `module`
//! is the last path segment of the record target (`pipeline`, `cloud`,
//! `draw`), so batch logs show which stage emitted a line. Install it once
//! with [`init_with_level`], or with [`init_from_env`] to take the level from
//! `MAS_PERCEPTION_LOG` (default `warn`) when the host has no logger of its
//! own. Builds with the `tracing` feature can use [`init_tracing`] instead.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_from_env`].
pub const LOG_ENV_VAR: &str = "MAS_PERCEPTION_LOG";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {}
}

fn format_line(elapsed: f64, level: log::Level, target: &str, msg: impl std::fmt::Display) -> String {
    let module = target.rsplit("::").next().unwrap_or_default();
    format!("[{elapsed:7.3}s {level:>5} {module}] {msg}")
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization; the first level wins.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install the stderr logger with the level named in `MAS_PERCEPTION_LOG`
/// (`error`, `warn`, `info`, `debug`, `trace`, `off`), `warn` if unset or
/// unparsable.
pub fn init_from_env() -> Result<(), log::SetLoggerError> {
    init_with_level(level_from_env(std::env::var(LOG_ENV_VAR).ok().as_deref()))
}

fn level_from_env(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Warn)
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
