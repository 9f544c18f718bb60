//! Process-wide logger backing the `log` facade.
//!
//! Every record goes to stdout and is appended to `logs/shop_refresher.log`
//! with a millisecond timestamp.

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the log inside the logs directory.
pub const LOG_FILE_NAME: &str = "shop_refresher.log";

struct FileLogger {
    file: Mutex<Option<File>>,
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(&Local::now().format("%H:%M:%S%.3f").to_string(), record);
        print!("{}", line);

        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

fn format_line(timestamp: &str, record: &Record) -> String {
    format!("[{}] {:<5} {}\n", timestamp, record.level(), record.args())
}

/// Returns the path of the log file inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Installs the global logger. Logging to the file is skipped if it cannot be opened.
///
/// Returns an error if a logger was already installed.
pub fn init(log_dir: &Path, debug: bool) -> Result<(), log::SetLoggerError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir))
        .ok();

    log::set_boxed_logger(Box::new(FileLogger {
        file: Mutex::new(file),
    }))?;
    set_debug(debug);
    Ok(())
}

/// Switches between `Debug` and `Info` verbosity.
pub fn set_debug(debug: bool) {
    log::set_max_level(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}
