//! Configuration types and loading for astrocam
//!
//! Settings come from a `config.env` file of `SAI_*` keys and the monitored
//! areas from `areas.txt`. Both are looked up next to the executable first and
//! then in the current working directory.

use crate::error::{Error, Result};
use crate::types::Area;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Name of the settings file
pub const CONFIG_FILE: &str = "config.env";

/// Name of the areas file
pub const AREAS_FILE: &str = "areas.txt";

/// Smallest scan interval the loop will run with
pub const MIN_INTERVAL: Duration = Duration::from_secs(15);

/// Interval used when none (or an invalid one) is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Largest accepted scan interval (24 hours)
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

/// Files per archive when `SAI_COUNT` is absent
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Archive format selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArchiveMode {
    /// RAR when the tool is installed, compressed ZIP otherwise (default)
    #[default]
    Auto,
    /// RAR, downgraded to compressed ZIP when the tool is missing
    Rar,
    /// Deflate-compressed ZIP
    Zip,
    /// Stored (uncompressed) ZIP
    ZipUncompressed,
}

impl ArchiveMode {
    /// Parse a mode string, case-insensitively; `None` for unknown modes
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(ArchiveMode::Auto),
            "rar" => Some(ArchiveMode::Rar),
            "zip" => Some(ArchiveMode::Zip),
            "zip-uncompressed" => Some(ArchiveMode::ZipUncompressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveMode::Auto => f.write_str("auto"),
            ArchiveMode::Rar => f.write_str("rar"),
            ArchiveMode::Zip => f.write_str("zip"),
            ArchiveMode::ZipUncompressed => f.write_str("zip-uncompressed"),
        }
    }
}

/// Main configuration for astrocam
#[derive(Clone, Debug)]
pub struct Config {
    /// Upload endpoint URL (`SAI_SERVER`)
    pub server: String,

    /// Basic auth username (`SAI_USERNAME`), trimmed
    pub username: String,

    /// Basic auth password (`SAI_PASSWORD`), trimmed
    pub password: String,

    /// Directory the camera writes images to (`SAI_CAMERA_DIRECTORY`)
    pub camera_dir: PathBuf,

    /// Directory archived images are moved to (`SAI_PROCESSED_DIRECTORY`)
    pub processed_dir: PathBuf,

    /// Scan interval after max-bound validation (`SAI_INTERVAL`)
    pub scan_interval: Duration,

    /// Interval as written in the config file, kept for the startup summary
    pub requested_interval: Duration,

    /// Files per archive (`SAI_COUNT`)
    pub batch_size: usize,

    /// Archive name prefix, placed before the area (`SAI_PREFIX`)
    pub prefix: String,

    /// Archive name postfix, placed before the extension (`SAI_POSTFIX`)
    pub postfix: String,

    /// Archive format selection (`SAI_ARCHIVE_MODE`)
    pub archive_mode: ArchiveMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            username: String::new(),
            password: String::new(),
            camera_dir: PathBuf::from("data"),
            processed_dir: PathBuf::from("processed"),
            scan_interval: DEFAULT_INTERVAL,
            requested_interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            prefix: String::new(),
            postfix: String::new(),
            archive_mode: ArchiveMode::default(),
        }
    }
}

impl Config {
    /// Defaults with the camera and processed directories under `base_dir`
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self {
            camera_dir: base_dir.join("data"),
            processed_dir: base_dir.join("processed"),
            ..Default::default()
        }
    }

    /// Load settings from a `config.env` file on top of [`Config::with_base_dir`]
    ///
    /// Lines that fail to parse are skipped with a warning. Invalid values fall
    /// back to defaults the same way a missing key does, except for a batch
    /// size below one, which is rejected.
    pub fn from_env_file(path: &Path, base_dir: &Path) -> Result<Self> {
        let mut config = Self::with_base_dir(base_dir);

        let entries = dotenvy::from_path_iter(path).map_err(|e| Error::Config {
            message: format!("could not read {}: {}", path.display(), e),
            key: None,
        })?;

        for entry in entries {
            match entry {
                Ok((key, value)) => config.apply(&key, strip_inline_comment(&value))?,
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed config line"),
            }
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "SAI_SERVER" => self.server = value.to_string(),
            "SAI_USERNAME" => self.username = value.trim().to_string(),
            "SAI_PASSWORD" => self.password = value.trim().to_string(),
            "SAI_CAMERA_DIRECTORY" if !value.is_empty() => self.camera_dir = PathBuf::from(value),
            "SAI_PROCESSED_DIRECTORY" if !value.is_empty() => {
                self.processed_dir = PathBuf::from(value)
            }
            "SAI_INTERVAL" => self.apply_interval(value),
            "SAI_COUNT" => match value.parse::<i64>() {
                Ok(count) if count >= 1 => self.batch_size = count as usize,
                Ok(count) => {
                    return Err(Error::config(
                        "SAI_COUNT",
                        format!("batch size must be at least 1, got {count}"),
                    ));
                }
                Err(_) => warn!(
                    value,
                    default = self.batch_size,
                    "invalid SAI_COUNT, keeping default"
                ),
            },
            "SAI_PREFIX" => self.prefix = value.to_string(),
            "SAI_POSTFIX" => self.postfix = value.to_string(),
            "SAI_ARCHIVE_MODE" if !value.is_empty() => match ArchiveMode::parse(value) {
                Some(mode) => self.archive_mode = mode,
                None => {
                    warn!(value, "unknown SAI_ARCHIVE_MODE, using auto");
                    self.archive_mode = ArchiveMode::Auto;
                }
            },
            _ => {}
        }
        Ok(())
    }

    fn apply_interval(&mut self, value: &str) {
        if value.is_empty() {
            self.requested_interval = DEFAULT_INTERVAL;
            self.scan_interval = DEFAULT_INTERVAL;
            return;
        }

        match value.parse::<i64>() {
            Err(_) => {
                warn!(
                    value,
                    default_secs = DEFAULT_INTERVAL.as_secs(),
                    "invalid SAI_INTERVAL, using default"
                );
                self.requested_interval = DEFAULT_INTERVAL;
                self.scan_interval = DEFAULT_INTERVAL;
            }
            Ok(secs) => {
                let requested = Duration::from_secs(secs.max(0) as u64);
                self.requested_interval = requested;
                if requested > MAX_INTERVAL {
                    warn!(
                        requested_secs = requested.as_secs(),
                        max_secs = MAX_INTERVAL.as_secs(),
                        default_secs = DEFAULT_INTERVAL.as_secs(),
                        "SAI_INTERVAL exceeds maximum, using default"
                    );
                    self.scan_interval = DEFAULT_INTERVAL;
                } else {
                    self.scan_interval = requested;
                }
            }
        }
    }

    /// Interval the loop actually runs with, never below [`MIN_INTERVAL`]
    pub fn effective_interval(&self) -> Duration {
        self.scan_interval.max(MIN_INTERVAL)
    }

    /// Basic auth credentials, only when both are non-empty after trimming
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.trim();
        let password = self.password.trim();
        if username.is_empty() || password.is_empty() {
            None
        } else {
            Some((username, password))
        }
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 1 {
            return Err(Error::config("SAI_COUNT", "batch size must be at least 1"));
        }

        if self.server.trim().is_empty() {
            return Err(Error::config("SAI_SERVER", "upload server URL is required"));
        }

        let url = url::Url::parse(self.server.trim()).map_err(|e| {
            Error::config("SAI_SERVER", format!("invalid server URL {}: {}", self.server, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(
                "SAI_SERVER",
                format!("server URL must use http or https, got {}", url.scheme()),
            ));
        }

        Ok(())
    }
}

/// Drop everything after a `#` and trim the rest
fn strip_inline_comment(value: &str) -> &str {
    match value.find('#') {
        Some(pos) => value[..pos].trim(),
        None => value.trim(),
    }
}

/// Directory containing the running executable
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| Error::Config {
        message: format!("executable path {} has no parent", exe.display()),
        key: None,
    })
}

/// Find a file next to the executable, falling back to the working directory
pub fn find_config_file(name: &str) -> Option<PathBuf> {
    if let Ok(dir) = executable_dir() {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let local = PathBuf::from(name);
    local.is_file().then_some(local)
}

/// Load the configuration, falling back to defaults when no `config.env` exists
pub fn load_config(base_dir: &Path) -> Result<Config> {
    match find_config_file(CONFIG_FILE) {
        Some(path) => {
            info!(path = %path.display(), "using config file");
            Config::from_env_file(&path, base_dir)
        }
        None => {
            warn!(
                "could not find {} next to the executable or in the current directory, using defaults",
                CONFIG_FILE
            );
            Ok(Config::with_base_dir(base_dir))
        }
    }
}

/// Read areas from a file, one per non-empty line
pub fn read_areas(path: &Path) -> Result<Vec<Area>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("could not open {}: {}", path.display(), e),
        key: None,
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Area::from)
        .collect())
}

/// Locate and read `areas.txt`
pub fn load_areas() -> Result<Vec<Area>> {
    let path = find_config_file(AREAS_FILE).ok_or_else(|| Error::Config {
        message: format!(
            "could not find {} next to the executable or in the current directory",
            AREAS_FILE
        ),
        key: None,
    })?;
    info!(path = %path.display(), "using areas file");
    read_areas(&path)
}
