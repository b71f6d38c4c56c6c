//! Wrapper configuration and management

use crate::{
    rotation::{DEFAULT_BACKUP_COUNT, DEFAULT_MAX_BYTES},
    sanitization::{SanitizationPatterns, Sanitizer},
    Error, Result,
};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory used for every default file location
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalltraceConfig {
    /// Timing wrapper settings
    pub timer: TimerConfig,

    /// Error wrapper settings
    pub catcher: CatcherConfig,
}

/// Options of the timing wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Print a human-readable line per call on stderr
    pub log_to_console: bool,

    /// Append a row per call to the metrics table
    pub log_to_file: bool,

    /// Sample CPU time and resident memory around each call
    pub track_resources: bool,

    /// Longest rendering kept for a single argument, in characters
    pub max_arg_length: Option<usize>,

    /// Directory holding the log file and the metrics table
    pub log_dir: PathBuf,

    /// Structured log file name inside `log_dir`
    pub log_file_name: String,

    /// Metrics table file name inside `log_dir`
    pub results_file_name: String,

    /// Size bound of the structured log before rotation
    pub max_bytes: u64,

    /// Rotated log files kept
    pub backup_count: u32,

    /// Regex patterns redacted from arguments and error messages
    pub redaction_patterns: Vec<String>,

    /// Also redact the built-in credential, PII and card-number patterns
    pub default_redaction: bool,

    /// Write the arguments column as `{"args": [...], "kwargs": {...}}`
    pub json_arguments: bool,
}

/// Options of the error wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatcherConfig {
    /// Print errors on stderr
    pub log_to_console: bool,

    /// Write errors to `error_log_file`
    pub log_to_file: bool,

    /// Rotating error log location
    pub error_log_file: PathBuf,

    /// Size bound of the error log before rotation
    pub max_bytes: u64,

    /// Rotated error log files kept
    pub backup_count: u32,

    /// Regex patterns redacted from error messages
    pub redaction_patterns: Vec<String>,

    /// Also redact the built-in credential, PII and card-number patterns
    pub default_redaction: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            log_to_console: true,
            log_to_file: true,
            track_resources: true,
            max_arg_length: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_file_name: "timing.log".to_string(),
            results_file_name: "timing_results.csv".to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
            redaction_patterns: Vec::new(),
            default_redaction: false,
            json_arguments: false,
        }
    }
}

impl Default for CatcherConfig {
    fn default() -> Self {
        Self {
            log_to_console: true,
            log_to_file: true,
            error_log_file: Path::new(DEFAULT_LOG_DIR).join("error.log"),
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
            redaction_patterns: Vec::new(),
            default_redaction: false,
        }
    }
}

impl TimerConfig {
    /// Place every file under `log_dir`
    pub fn in_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    pub fn results_file_path(&self) -> PathBuf {
        self.log_dir.join(&self.results_file_name)
    }

    /// Sanitizer compiled from `redaction_patterns` and, if enabled, the built-in patterns
    pub fn pattern_sanitizer(&self) -> Result<Sanitizer> {
        pattern_sanitizer(&self.redaction_patterns, self.default_redaction)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(Error::Config {
                message: "timer.max_bytes must be greater than 0".to_string(),
            });
        }

        if self.max_arg_length == Some(0) {
            return Err(Error::Config {
                message: "timer.max_arg_length must be greater than 0".to_string(),
            });
        }

        if self.log_file_name.is_empty() || self.results_file_name.is_empty() {
            return Err(Error::Config {
                message: "timer file names must not be empty".to_string(),
            });
        }

        validate_patterns(&self.redaction_patterns)
    }
}

impl CatcherConfig {
    /// Put the error log at `error_log_file`
    pub fn with_log_file(error_log_file: impl Into<PathBuf>) -> Self {
        Self {
            error_log_file: error_log_file.into(),
            ..Self::default()
        }
    }

    /// Sanitizer compiled from `redaction_patterns` and, if enabled, the built-in patterns
    pub fn pattern_sanitizer(&self) -> Result<Sanitizer> {
        pattern_sanitizer(&self.redaction_patterns, self.default_redaction)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(Error::Config {
                message: "catcher.max_bytes must be greater than 0".to_string(),
            });
        }

        validate_patterns(&self.redaction_patterns)
    }
}

fn pattern_sanitizer(patterns: &[String], default_redaction: bool) -> Result<Sanitizer> {
    let mut all = Vec::new();
    if default_redaction {
        all.extend(SanitizationPatterns::all_default_patterns());
    }
    all.extend_from_slice(patterns);

    if all.is_empty() {
        Ok(Sanitizer::identity())
    } else {
        Sanitizer::from_patterns(&all)
    }
}

fn validate_patterns(patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        regex::Regex::new(pattern).map_err(|e| Error::Config {
            message: format!("Invalid redaction pattern '{}': {}", pattern, e),
        })?;
    }
    Ok(())
}

impl CalltraceConfig {
    /// Load configuration from file or create default
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            toml::from_str(&content).map_err(|e| Error::Config {
                message: format!("Failed to parse calltrace config: {}", e),
            })?
        } else {
            Self::default()
        };

        config.load_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: format!("Failed to serialize calltrace config: {}", e),
        })?;

        tokio::fs::write(&config_file, content).await?;
        Ok(())
    }

    /// Load environment variable overrides
    pub fn load_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CALLTRACE_LOG_DIR") {
            let dir = PathBuf::from(dir);
            self.catcher.error_log_file = dir.join("error.log");
            self.timer.log_dir = dir;
        }

        if let Ok(enabled) = std::env::var("CALLTRACE_CONSOLE") {
            if let Ok(enabled) = enabled.parse() {
                self.timer.log_to_console = enabled;
                self.catcher.log_to_console = enabled;
            }
        }

        if let Ok(enabled) = std::env::var("CALLTRACE_FILE_LOGGING") {
            if let Ok(enabled) = enabled.parse() {
                self.timer.log_to_file = enabled;
                self.catcher.log_to_file = enabled;
            }
        }

        if let Ok(enabled) = std::env::var("CALLTRACE_TRACK_RESOURCES") {
            self.timer.track_resources = enabled.parse().unwrap_or(self.timer.track_resources);
        }

        if let Ok(enabled) = std::env::var("CALLTRACE_DEFAULT_REDACTION") {
            if let Ok(enabled) = enabled.parse() {
                self.timer.default_redaction = enabled;
                self.catcher.default_redaction = enabled;
            }
        }

        if let Ok(length) = std::env::var("CALLTRACE_MAX_ARG_LENGTH") {
            if let Ok(length) = length.parse() {
                self.timer.max_arg_length = Some(length);
            }
        }
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "calltrace", "calltrace").ok_or_else(|| Error::Config {
                message: "Could not determine config directory".to_string(),
            })?;

        Ok(project_dirs.config_dir().join("calltrace.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.timer.validate()?;
        self.catcher.validate()
    }
}
