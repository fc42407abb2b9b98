//! A minimal, zero-dependency logging crate for the `tether` workspace.
//!
//! Resource lifetimes are hard to follow from the outside, so every crate in
//! the workspace reports releases, deferred teardown and traversal state
//! through these macros. Output goes to stderr so it never mixes with the
//! data a program prints.
//!
//! # Example
//!
//! ```
//! use tether_log::{debug, error, info, warn, Level};
//!
//! tether_log::set_level(Level::Debug);
//!
//! let kind = "TranslationUnit";
//! info!("{} parsed", kind);
//! debug!("holds: {:?}", vec![1, 2, 3]);
//! warn!("handler failed, aborting traversal");
//! error!("contract violation");
//! ```
//!
//! # Configuration
//!
//! - `TETHER_LOG` selects the level when [`init_from_env`] is called
//!   (`off`, `error`, `warn`, `info`, `debug`, `trace`).
//! - `NO_COLOR` disables ANSI colours.

use std::fmt::Arguments;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Environment variable consulted by [`init_from_env`].
pub const LOG_ENV: &str = "TETHER_LOG";

/// Log levels representing the severity of log messages.
///
/// Lower numeric values indicate higher severity. `Off` is only meaningful as
/// a logger threshold; nothing is ever logged at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Logging disabled
    Off = 0,
    /// Contract violations and unrecoverable failures
    Error = 1,
    /// Recoverable failures (captured handler errors, deferred teardown)
    Warn = 2,
    /// Lifecycle milestones
    Info = 3,
    /// Traversal state transitions
    Debug = 4,
    /// Every acquire, release and disposal
    Trace = 5,
}

impl Level {
    const fn color_code(&self) -> &'static str {
        match self {
            Level::Off => "",
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the string representation of this log level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Off => "OFF",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Off,
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            4 => Level::Debug,
            _ => Level::Trace,
        }
    }

    /// Parses a level name, case-insensitively.
    ///
    /// ```
    /// use tether_log::Level;
    ///
    /// assert_eq!(Level::from_str("trace"), Ok(Level::Trace));
    /// assert_eq!(Level::from_str("OFF"), Ok(Level::Off));
    /// assert!(Level::from_str("loud").is_err());
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_uppercase().as_str() {
            "OFF" | "NONE" => Ok(Level::Off),
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// The global logger.
///
/// Level and colour are atomics so the logger can be reconfigured from any
/// thread while others are logging.
pub struct Logger {
    level: AtomicU8,
    color: AtomicBool,
}

impl Logger {
    const fn new(level: Level, color: bool) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            color: AtomicBool::new(color),
        }
    }

    /// Sets the minimum log level.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum log level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Enables or disables ANSI colour codes.
    pub fn set_color(&self, enabled: bool) {
        self.color.store(enabled, Ordering::Relaxed);
    }

    /// Checks if a message at the given level would be logged.
    pub fn enabled(&self, level: Level) -> bool {
        level != Level::Off && level as u8 <= self.level.load(Ordering::Relaxed)
    }

    fn write(&self, level: Level, target: &str, args: Arguments) {
        const RESET: &str = "\x1b[0m";

        let mut stderr = std::io::stderr().lock();
        let level_str = level.as_str();
        // A failed write to stderr has nowhere better to be reported.
        let _ = if self.color.load(Ordering::Relaxed) {
            let color = level.color_code();
            writeln!(stderr, "{color}[{level_str}]{RESET} {target}: {args}")
        } else {
            writeln!(stderr, "[{level_str}] {target}: {args}")
        };
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at `Level::Warn` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn, std::env::var_os("NO_COLOR").is_none()))
}

/// Sets the minimum log level for the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum log level from a string.
///
/// ```
/// tether_log::set_level_from_str("debug").unwrap();
/// assert!(tether_log::set_level_from_str("chatty").is_err());
/// ```
pub fn set_level_from_str(s: &str) -> Result<(), String> {
    let level = Level::from_str(s)?;
    set_level(level);
    Ok(())
}

/// Configures the global logger from `TETHER_LOG`.
///
/// An unset variable leaves the current level alone. An unparsable value is
/// reported and also leaves the level alone.
pub fn init_from_env() -> Level {
    if let Ok(value) = std::env::var(LOG_ENV) {
        if let Err(message) = set_level_from_str(&value) {
            get_logger().write(Level::Warn, module_path!(), format_args!("{LOG_ENV}: {message}"));
        }
    }
    get_logger().level()
}

/// Called by the log macros after the level check.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    let logger = get_logger();
    if logger.enabled(level) {
        logger.write(level, target, args);
    }
}

/// The primary logging macro.
///
/// ```
/// use tether_log::{log, Level};
///
/// log!(level: Level::Info, "released {} handles", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
