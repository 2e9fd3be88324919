use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use simplelog::*;

use parley_core::paths;

/// Which binary is logging; decides the file name and whether warnings
/// also go to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Server,
    Client,
}

impl LogSink {
    fn file_name(self) -> &'static str {
        match self {
            LogSink::Server => "server.log",
            LogSink::Client => "client.log",
        }
    }
}

pub fn file_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install the global logger and return the log file path.
///
/// The server mirrors warnings to stderr; the client logs only to its file
/// so the chat console stays readable.
pub fn init_logging(sink: LogSink, verbose: bool) -> Result<PathBuf> {
    let level = file_level(verbose);
    let (log_file, log_path) = open_log_file(sink)?;

    match sink {
        LogSink::Server => CombinedLogger::init(vec![
            TermLogger::new(
                LevelFilter::Warn,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ),
            WriteLogger::new(level, Config::default(), log_file),
        ]),
        LogSink::Client => WriteLogger::init(level, Config::default(), log_file),
    }
    .context("failed to initialize logger")?;

    log::info!("parley {:?} starting (log level: {:?})", sink, level);
    Ok(log_path)
}

fn open_log_file(sink: LogSink) -> Result<(File, PathBuf)> {
    let log_path = paths::log_path(sink.file_name());
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match File::create(&log_path) {
        Ok(file) => Ok((file, log_path)),
        Err(_) => {
            let fallback = std::env::temp_dir().join(format!("parley-{}", sink.file_name()));
            let file = File::create(&fallback)
                .with_context(|| format!("cannot create log file {}", fallback.display()))?;
            Ok((file, fallback))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_file_level() {
        assert_eq!(file_level(false), LevelFilter::Info);
        assert_eq!(file_level(true), LevelFilter::Debug);
    }

    #[test]
    fn sinks_log_to_separate_files() {
        assert_ne!(LogSink::Server.file_name(), LogSink::Client.file_name());
    }
}
