//! Stderr logger for the `log` facade
//!
//! The level comes from `-v` flags when given, otherwise from `[log] level`.

use llvmc_config::LogLevel;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "[{}] {}: {}",
                record.level().as_str().to_lowercase(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Level for `verbose` repetitions of `-v`, falling back to the configured one
pub fn level_for(verbose: u8, configured: LogLevel) -> LevelFilter {
    match verbose {
        0 => match configured {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        },
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. Later calls only adjust the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_config() {
        assert_eq!(level_for(0, LogLevel::Error), LevelFilter::Error);
        assert_eq!(level_for(1, LogLevel::Error), LevelFilter::Info);
        assert_eq!(level_for(2, LogLevel::Off), LevelFilter::Debug);
        assert_eq!(level_for(5, LogLevel::Warn), LevelFilter::Trace);
    }
}
