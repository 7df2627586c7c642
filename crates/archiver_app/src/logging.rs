//! Logging initialization for the archiver binary.
//!
//! Logs go to the terminal and, unless disabled, to a file (`./archiver.log`
//! by default) in the current working directory.

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const DEFAULT_LOG_FILE: &str = "./archiver.log";

/// Destination for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Write to the terminal only.
    Terminal,
    /// Write to the terminal and to the given file.
    Both(PathBuf),
}

impl LogDestination {
    /// `LOG_FILE` unset means the default file; `off`, `none` or `-` disable
    /// the file logger.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE)),
            Some(v) if matches!(v.to_ascii_lowercase().as_str(), "off" | "none" | "-") => {
                LogDestination::Terminal
            }
            Some(path) => LogDestination::Both(PathBuf::from(path)),
        }
    }
}

/// Initialize the global logger.
pub fn initialize(level: LevelFilter, destination: LogDestination) {
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let LogDestination::Both(path) = destination {
        if let Some(file_logger) = create_file_logger(level, config, path) {
            loggers.push(file_logger);
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build()
}

fn create_file_logger(
    level: LevelFilter,
    config: Config,
    log_path: PathBuf,
) -> Option<Box<WriteLogger<File>>> {
    match File::create(&log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_setting() {
        assert_eq!(
            LogDestination::from_setting(None),
            LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE))
        );
        assert_eq!(LogDestination::from_setting(Some("OFF")), LogDestination::Terminal);
        assert_eq!(
            LogDestination::from_setting(Some("/tmp/a.log")),
            LogDestination::Both(PathBuf::from("/tmp/a.log"))
        );
    }
}
