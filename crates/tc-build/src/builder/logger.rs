//! Console logger.
//!
//! Implements the `log::Log` trait. Informational lines go to stdout so they
//! interleave in order with the output of the build systems we spawn;
//! warnings and errors go to stderr in colour.

use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write;

/// Environment variable that overrides the default log level.
pub const LOG_ENV: &str = "TC_BUILD_LOG";

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), &record.args().to_string());
        if record.level() <= Level::Warn {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

fn format_line(level: Level, msg: &str) -> String {
    match level {
        Level::Error => format!("\x1b[01;31mE: {msg}\x1b[0m"),
        Level::Warn => format!("\x1b[01;33mW: {msg}\x1b[0m"),
        Level::Info => format!("I: {msg}"),
        Level::Debug | Level::Trace => format!("D: {msg}"),
    }
}

/// Pick the maximum level from `--verbose` and the `TC_BUILD_LOG` value.
pub fn level(verbose: bool, env: Option<&str>) -> LevelFilter {
    if verbose {
        return LevelFilter::Debug;
    }
    env.and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the logger.
///
/// Only the first call installs it; later calls just adjust the level.
pub fn init(max_level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max_level);
}

/// Flush both standard streams before handing the terminal to a child.
pub fn flush() {
    log::logger().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_defaults_to_info() {
        assert_eq!(level(false, None), LevelFilter::Info);
        assert_eq!(level(false, Some("nonsense")), LevelFilter::Info);
    }

    #[test]
    fn test_level_from_env() {
        assert_eq!(level(false, Some("warn")), LevelFilter::Warn);
        assert_eq!(level(false, Some(" DEBUG ")), LevelFilter::Debug);
    }

    #[test]
    fn test_verbose_wins_over_env() {
        assert_eq!(level(true, Some("error")), LevelFilter::Debug);
    }

    #[test]
    fn test_line_prefixes() {
        assert_eq!(format_line(Level::Info, "Applied x.patch"), "I: Applied x.patch");
        assert_eq!(format_line(Level::Debug, "probe"), "D: probe");
        assert!(format_line(Level::Warn, "skipping").contains("W: skipping"));
        assert!(format_line(Level::Error, "boom").contains("E: boom"));
    }
}
