use std::io;
use std::path::{Path, PathBuf};

use slog::{o, Drain, Logger};

use crate::prelude::*;

/// Where the root logger writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    /// A file, or a directory receiving a file named after the current time
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Full,
}

impl LogFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "compact" => Some(LogFormat::Compact),
            "full" => Some(LogFormat::Full),
            _ => None,
        }
    }
}

fn get_datetime_str() -> String {
    chrono::offset::Local::now()
        .format("%d-%m-%Y_%H-%M")
        .to_string()
}

fn write_clock(out: &mut dyn io::Write) -> io::Result<()> {
    write!(out, "{}", chrono::offset::Local::now().format("%H:%M:%S"))
}

fn open_log_file(path: &Path) -> UResult<std::fs::File> {
    let path = if path.is_dir() {
        path.join(format!("{}.txt", get_datetime_str()))
    } else {
        path.to_path_buf()
    };
    Ok(std::fs::File::create(path)?)
}

fn build_root<D>(decorator: D, format: LogFormat) -> Logger
where
    D: slog_term::Decorator + Send + 'static,
{
    match format {
        LogFormat::Compact => {
            let drain = slog_term::CompactFormat::new(decorator)
                .use_custom_timestamp(write_clock)
                .build()
                .fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            slog::Logger::root(drain, o!())
        }
        LogFormat::Full => {
            let drain = slog_term::FullFormat::new(decorator)
                .use_original_order()
                .use_custom_timestamp(write_clock)
                .build()
                .fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            slog::Logger::root(drain, o!())
        }
    }
}

/// Инициализатор корневого логгера
pub fn try_configure_root(target: &LogTarget, format: LogFormat) -> UResult<Logger> {
    let logger = match target {
        LogTarget::Terminal => build_root(slog_term::TermDecorator::new().build(), format),
        LogTarget::File(path) => {
            let file = open_log_file(path)?;
            build_root(slog_term::PlainDecorator::new(file), format)
        }
    };
    Ok(logger)
}

/// Same as [`try_configure_root`], but never fails: the error goes to
/// stderr and the returned logger discards everything.
pub fn configure_root(target: &LogTarget, format: LogFormat) -> Logger {
    match try_configure_root(target, format) {
        Ok(logger) => logger,
        Err(why) => {
            eprintln!("Could not configure logging for {:?}: {}", target, why);
            Logger::root(slog::Discard, o!())
        }
    }
}

/// Child logger tagged with the name of the component writing to it
pub fn named(logger: &Logger, source: &'static str) -> Logger {
    logger.new(o!("source" => source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritable_file_target_falls_back() {
        let target = LogTarget::File("/nonexistent-kestrel-dir/deeper/log.txt".into());
        assert!(try_configure_root(&target, LogFormat::Full).is_err());

        let logger = configure_root(&target, LogFormat::Full);
        info!(logger, "still usable");
    }

    #[test]
    fn directory_target_gets_a_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = LogTarget::File(dir.path().to_path_buf());
        let logger = try_configure_root(&target, LogFormat::Compact).unwrap();
        info!(named(&logger, "Test"), "hello");

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn format_names() {
        assert_eq!(LogFormat::parse("full"), Some(LogFormat::Full));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("json"), None);
    }
}
