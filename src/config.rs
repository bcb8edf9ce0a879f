use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::remote::DEFAULT_MENU_URL;
use crate::{AppError, AppResult};

pub const APP_IDENTIFIER: &str = "com.littlelemon.app";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_IMAGE_BASE_URL: &str =
    "https://github.com/Meta-Mobile-Developer-PC/Working-With-Data-API/blob/main/images";

pub const ENV_CONFIG: &str = "LITTLELEMON_CONFIG";
pub const ENV_DATA_DIR: &str = "LITTLELEMON_DATA_DIR";
pub const ENV_MENU_URL: &str = "LITTLELEMON_MENU_URL";
pub const ENV_DEBOUNCE_MS: &str = "LITTLELEMON_DEBOUNCE_MS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "LITTLELEMON_FETCH_TIMEOUT_MS";
pub const ENV_LOG_DIR: &str = "LITTLELEMON_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub profile_file: String,
    pub menu_url: String,
    pub image_base_url: String,
    pub debounce_ms: u64,
    /// `None` leaves the remote fetch unbounded.
    pub fetch_timeout_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: "little_lemon.db".into(),
            profile_file: "profile.json".into(),
            menu_url: DEFAULT_MENU_URL.into(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.into(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            fetch_timeout_ms: None,
            log_dir: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_IDENTIFIER)
}

impl AppConfig {
    /// Defaults, then the JSON file named by `LITTLELEMON_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> AppResult<Self> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::from(err).with_context("config_path", path.display().to_string())
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            AppError::from(err).with_context("config_path", path.display().to_string())
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_MENU_URL).filter(|v| !v.trim().is_empty()) {
            self.menu_url = url;
        }
        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            self.debounce_ms = parse_millis(ENV_DEBOUNCE_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT_MS) {
            self.fetch_timeout_ms = match parse_millis(ENV_FETCH_TIMEOUT_MS, &raw)? {
                0 => None,
                ms => Some(ms),
            };
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join(&self.profile_file)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_millis(key: &str, raw: &str) -> AppResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        AppError::new("CONFIG/INVALID", "Expected a non-negative integer (milliseconds)")
            .with_context("key", key)
            .with_context("value", raw)
    })
}
