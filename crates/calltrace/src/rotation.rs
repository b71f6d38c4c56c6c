//! Size-bounded log file rotation

use crate::{metrics::MetricsUtil, Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing_subscriber::fmt::MakeWriter;

/// Default size bound for a log file (10 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated backups kept
pub const DEFAULT_BACKUP_COUNT: u32 = 5;

/// Log files currently open in this process, keyed by canonical path
static OPEN_LOGS: Lazy<Mutex<HashMap<PathBuf, Weak<LogFile>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Open file handle and its tracked size, guarded together
struct WriterState {
    file: File,
    size: u64,
    /// Most recent failed write, until a logger picks it up
    last_error: Option<String>,
}

struct LogFile {
    path: PathBuf,
    max_bytes: u64,
    backup_count: u32,
    state: Mutex<WriterState>,
}

/// Append-only writer that rotates its file once a record would push it past `max_bytes`.
///
/// Backups are numbered: `<name>.1` is the newest, `<name>.<backup_count>` the
/// oldest. Every `write` call is treated as one record and written while holding
/// the writer lock, so records from concurrent threads never interleave and no
/// record lands in a file that is being rotated.
///
/// All writers opened on the same file within a process share that lock. The
/// first writer's `max_bytes` and `backup_count` govern the file for as long as
/// any writer on it is alive.
#[derive(Clone)]
pub struct RotatingFileWriter {
    log: Arc<LogFile>,
}

impl RotatingFileWriter {
    /// Open (or create) the log file at `path`, joining a writer already open on it
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backup_count: u32) -> Result<Self> {
        let path = path.into();

        if max_bytes == 0 {
            return Err(Error::Config {
                message: "max_bytes must be greater than 0".to_string(),
            });
        }

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let key = canonical_key(&path)?;
        let mut open_logs = OPEN_LOGS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        open_logs.retain(|_, log| log.strong_count() > 0);

        if let Some(log) = open_logs.get(&key).and_then(Weak::upgrade) {
            if log.max_bytes != max_bytes || log.backup_count != backup_count {
                tracing::warn!(
                    calltrace.event = "rotation_settings_ignored",
                    path = %log.path.display(),
                    max_bytes = log.max_bytes,
                    backup_count = log.backup_count,
                    "Log file already open with other rotation settings, keeping those"
                );
            }
            return Ok(Self { log });
        }

        let file = Self::open(&path)?;
        let size = file.metadata()?.len();

        let log = Arc::new(LogFile {
            path,
            max_bytes,
            backup_count,
            state: Mutex::new(WriterState {
                file,
                size,
                last_error: None,
            }),
        });
        open_logs.insert(key, Arc::downgrade(&log));

        Ok(Self { log })
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Path of the active log file
    pub fn path(&self) -> &Path {
        &self.log.path
    }

    pub fn max_bytes(&self) -> u64 {
        self.log.max_bytes
    }

    pub fn backup_count(&self) -> u32 {
        self.log.backup_count
    }

    /// Path of the `index`-th backup (1 is the newest)
    pub fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.log.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    /// Existing backup files, newest first
    pub fn backups(&self) -> Vec<PathBuf> {
        (1..=self.log.backup_count)
            .map(|index| self.backup_path(index))
            .filter(|path| path.exists())
            .collect()
    }

    /// Size of the active file as tracked by the writer
    pub fn current_size(&self) -> u64 {
        self.lock_state().size
    }

    /// Most recent failed write on this file, cleared by the call
    pub fn take_error(&self) -> Option<String> {
        self.lock_state().last_error.take()
    }

    fn lock_state(&self) -> MutexGuard<'_, WriterState> {
        // State is consistent between records even if a writer panicked
        self.log
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one record, rotating first when it would not fit
    pub fn write_record(&self, record: &[u8]) -> Result<()> {
        let mut state = self.lock_state();

        if state.size > 0 && state.size + record.len() as u64 > self.log.max_bytes {
            self.rotate(&mut state)?;
        }

        state.file.write_all(record)?;
        state.size += record.len() as u64;

        Ok(())
    }

    /// Shift backups up by one, dropping the oldest, and start a fresh file.
    /// Caller holds the state lock for the whole sequence.
    fn rotate(&self, state: &mut WriterState) -> Result<()> {
        state.file.flush()?;

        if self.log.backup_count == 0 {
            state.file.set_len(0)?;
            state.size = 0;
            return Ok(());
        }

        let path = &self.log.path;
        let rotation_error = |step: &str, e: io::Error| Error::Rotation {
            message: format!("{} failed for {}: {}", step, path.display(), e),
        };

        let oldest = self.backup_path(self.log.backup_count);
        if oldest.exists() {
            std::fs::remove_file(&oldest).map_err(|e| rotation_error("prune", e))?;
        }

        for index in (1..self.log.backup_count).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(index + 1))
                    .map_err(|e| rotation_error("shift", e))?;
            }
        }

        std::fs::rename(path, self.backup_path(1)).map_err(|e| rotation_error("archive", e))?;

        state.file = Self::open(path).map_err(|e| rotation_error("reopen", e))?;
        state.size = 0;

        ::metrics::counter!("calltrace.log.rotations").increment(1);

        Ok(())
    }
}

/// Canonical parent directory joined with the file name; the file itself may not exist yet
fn canonical_key(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| Error::Config {
        message: format!("log path {} has no file name", path.display()),
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    Ok(parent.canonicalize()?.join(file_name))
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_record(buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                // The record is dropped; the owning logger reports it outside its dispatch
                MetricsUtil::record_sink_error("log_file");
                let message = e.to_string();
                self.lock_state().last_error = Some(message.clone());
                Err(io::Error::new(io::ErrorKind::Other, message))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock_state().file.flush()
    }
}

impl std::fmt::Debug for RotatingFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFileWriter")
            .field("path", &self.log.path)
            .field("max_bytes", &self.log.max_bytes)
            .field("backup_count", &self.log.backup_count)
            .finish()
    }
}

// Implement MakeWriter for use with tracing-subscriber
impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
