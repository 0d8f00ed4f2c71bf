//! Colored `log` backend.
//!
//! Lines look like `[ARBITER][ INFO][3,-] message`, where `3` is the id of
//! the processor that logged. The level comes from the `LOG` environment
//! variable at run time, falling back to the value `LOG` had at build time:
//! - "ERROR" -> `LevelFilter::Error`
//! - "WARN" -> `LevelFilter::Warn`
//! - "INFO" -> `LevelFilter::Info`
//! - "DEBUG" -> `LevelFilter::Debug`
//! - "TRACE" -> `LevelFilter::Trace`
//! - anything else -> `LevelFilter::Off`

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;

use super::console::Color;
use crate::color_println;
use crate::processor::try_current_processor_id;

static LOGGER: ArbiterLogger = ArbiterLogger;
static INIT: Once<bool> = Once::new();

/// Installs the logger. Safe to call any number of times from any thread;
/// returns `false` if another logger was installed first.
pub fn init() -> bool {
    *INIT.call_once(|| {
        let installed = log::set_logger(&LOGGER).is_ok();
        if installed {
            log::set_max_level(level_from_env());
        }
        installed
    })
}

fn level_from_env() -> LevelFilter {
    let runtime = std::env::var("LOG").ok();
    parse_level(runtime.as_deref().or(option_env!("LOG")))
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    match value.map(str::to_ascii_uppercase).as_deref() {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

struct ArbiterLogger;

impl Log for ArbiterLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // `-` once the processor's local state is already torn down
        match try_current_processor_id() {
            Some(cpu) => color_println!(
                level_to_color(record.level()),
                "[ARBITER][{:>5}][{},-] {}",
                record.level(),
                cpu,
                record.args()
            ),
            None => color_println!(
                level_to_color(record.level()),
                "[ARBITER][{:>5}][-,-] {}",
                record.level(),
                record.args()
            ),
        }
    }

    fn flush(&self) {}
}

fn level_to_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::BrightYellow,
        Level::Info => Color::Blue,
        Level::Debug => Color::Green,
        Level::Trace => Color::BrightBlack,
    }
}
