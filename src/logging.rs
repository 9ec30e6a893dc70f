//! Persistent logging for the overlay engine.
//!
//! The engine runs inside a host VR process that usually has no console, so
//! the default sink is a daily log file with size-based rotation and cleanup.
//! Everything in the crate logs through the `log` facade with a bracketed
//! subsystem tag (`[ENGINE]`, `[GPU]`, ...).

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{OverlayResult, ResultExt};

/// Maximum log file size before rotation (5MB)
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of log files to keep
const MAX_LOG_FILES: usize = 5;

const LOG_FILE_PREFIX: &str = "windowdeck";

/// Where log records go.
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// Daily rotated files in the given directory.
    File(PathBuf),
    /// `env_logger` on stderr, filtered by `RUST_LOG`.
    Console,
}

impl LogTarget {
    /// File logging under `%PROGRAMDATA%\WindowDeck`, or the console when
    /// that directory is not known.
    pub fn default_target() -> Self {
        match default_log_dir() {
            Some(dir) => LogTarget::File(dir),
            None => LogTarget::Console,
        }
    }
}

fn default_log_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("PROGRAMDATA").map(|dir| PathBuf::from(dir).join("WindowDeck"))
    } else {
        None
    }
}

/// Install the global logger. Only the first call in a process takes effect.
pub fn init_logging(target: LogTarget, level: LevelFilter) -> OverlayResult<()> {
    match target {
        LogTarget::Console => env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init()
            .context("Failed to install logger"),
        LogTarget::File(dir) => {
            let logger = FileLogger::new(&dir, level)?;
            log::set_boxed_logger(Box::new(logger)).context("Failed to install logger")?;
            log::set_max_level(level);
            log::info!("[LOGGING] Log directory: {:?}", dir);
            Ok(())
        }
    }
}

/// `log::Log` implementation writing to `windowdeck_YYYY-MM-DD.log`.
pub struct FileLogger {
    dir: PathBuf,
    level: LevelFilter,
    file: Mutex<Option<File>>,
}

impl FileLogger {
    pub fn new(dir: &Path, level: LevelFilter) -> OverlayResult<Self> {
        fs::create_dir_all(dir)?;
        let file = open_append(&current_log_path(dir))?;
        cleanup_old_logs(dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            level,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn current_path(&self) -> PathBuf {
        current_log_path(&self.dir)
    }

    fn write_line(&self, line: &str) {
        let mut guard = self.file.lock();
        if let Some(file) = guard.as_mut() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
    }

    /// Rotate the current file once it grows past the size limit.
    fn check_rotation(&self) {
        let current_path = self.current_path();

        let Ok(metadata) = fs::metadata(&current_path) else {
            return;
        };
        if metadata.len() <= MAX_LOG_SIZE {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d_%H%M%S");
        let rotated_path = self
            .dir
            .join(format!("{}_{}.log", LOG_FILE_PREFIX, timestamp));

        let mut guard = self.file.lock();
        // Close before renaming, Windows refuses to rename open files.
        *guard = None;
        let _ = fs::rename(&current_path, &rotated_path);
        *guard = open_append(&current_path).ok();
        drop(guard);

        cleanup_old_logs(&self.dir);
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record);
        self.write_line(&line);

        #[cfg(debug_assertions)]
        eprint!("{}", line);

        self.check_rotation();
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

fn format_line(record: &Record) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!(
        "[{}] [{}] [{}] {}\n",
        timestamp,
        record.level(),
        record.target(),
        record.args()
    )
}

fn open_append(path: &Path) -> OverlayResult<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// One file per day.
fn current_log_path(log_dir: &Path) -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{}_{}.log", LOG_FILE_PREFIX, date))
}

/// Keep only the most recent MAX_LOG_FILES log files.
fn cleanup_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let path = e.path();
            path.extension().map(|ext| ext == "log").unwrap_or(false)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(LOG_FILE_PREFIX))
                    .unwrap_or(false)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    for file in log_files.into_iter().skip(MAX_LOG_FILES) {
        let _ = fs::remove_file(file.path());
    }
}
