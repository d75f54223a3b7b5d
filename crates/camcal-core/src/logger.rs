//! Stderr logging for the calibration tools.
//!
//! Records are written as `[uptime LEVEL target] message`. stdout is left
//! to the calibration report, so nothing here ever touches it.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    max: LevelFilter,
    epoch: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let uptime = self.epoch.elapsed().as_secs_f64();
            let _ = writeln!(
                std::io::stderr().lock(),
                "[{uptime:7.3}s {:>5} {}] {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static INSTALLED: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let logger = INSTALLED.get_or_init(|| StderrLogger {
        max: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse a case-insensitive level name (`off`, `error`, ..., `trace`).
pub fn parse_level_filter(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

/// Install a `tracing` fmt subscriber on stderr.
///
/// `try_init` also bridges `log` records into it. `RUST_LOG` wins when set;
/// otherwise `default_directive` (e.g. `"info"`) filters events.
#[cfg(feature = "tracing")]
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(fmt::time::Uptime::default())
        .finish()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level_filter("info"), Some(LevelFilter::Info));
        assert_eq!(parse_level_filter(" DEBUG "), Some(LevelFilter::Debug));
        assert_eq!(parse_level_filter("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level_filter("loud"), None);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_init_bridges_log_records() {
        init_tracing("debug");
        // A second call must be a quiet no-op.
        init_tracing("trace");
        assert!(log::log_enabled!(log::Level::Info));
    }
}
