//! Logger and logging macros
//!
//! For the macros to properly compile, the calling crate must add a dependency to
//! crate log (ie. `log.workspace = true`).

pub use log::{Level, LevelFilter};

const CONSOLE_APPENDER: &str = "stdout";
const LOG_FILE_APPENDER: &str = "log_file";
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f%:z)} [{({l}):5.5}] {m}{n}";

/// Initializes the global logger with a console appender and, if `log_dir` is
/// provided, a log-file appender under that directory.
///
/// # Panics
/// Panics if the logger was already initialized or the log file cannot be created.
pub fn init_logger(log_dir: Option<&str>, level: LevelFilter) {
    use log4rs::{
        append::{console::ConsoleAppender, file::FileAppender},
        config::{Appender, Config, Root},
        encode::pattern::PatternEncoder,
    };

    let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();
    let mut builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(stdout)));
    let mut root = Root::builder().appender(CONSOLE_APPENDER);

    if let Some(dir) = log_dir {
        let log_file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
            .build(std::path::Path::new(dir).join("arbor.log"))
            .unwrap();
        builder = builder.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(log_file)));
        root = root.appender(LOG_FILE_APPENDER);
    }

    let config = builder.build(root.build(level)).unwrap();
    log4rs::init_config(config).unwrap();
}

/// Tries to init the global logger, but does not panic if it was already setup.
/// Should be used for tests.
pub fn try_init_logger(level: LevelFilter) {
    use log4rs::{
        append::console::ConsoleAppender,
        config::{Appender, Config, Root},
        encode::pattern::PatternEncoder,
    };

    let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();
    let config = Config::builder()
        .appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(stdout)))
        .build(Root::builder().appender(CONSOLE_APPENDER).build(level))
        .unwrap();
    let _ = log4rs::init_config(config);
}

#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => (log::trace!($($t)*))
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => (log::debug!($($t)*))
}

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => (log::info!($($t)*))
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => (log::warn!($($t)*))
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => (log::error!($($t)*))
}
