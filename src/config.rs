use crate::error::{Result, ShadowError};
use crate::scheduler::Settings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Allowed repeat counts per segment.
pub const REPEAT_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Allowed shadowing multipliers.
pub const SHADOWING_TIME_RANGE: std::ops::RangeInclusive<f64> = 0.5..=3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local playback that pushes progress natively: an audio file when one
    /// is given, otherwise a silent media clock.
    #[default]
    Clock,
    /// VLC over its HTTP interface; must be polled.
    Vlc,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Clock => write!(f, "clock"),
            Backend::Vlc => write!(f, "vlc"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clock" | "local" => Ok(Backend::Clock),
            "vlc" => Ok(Backend::Vlc),
            _ => Err(format!("Unknown backend: {}. Use 'clock' or 'vlc'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repeat_count: u32,
    pub shadowing_time: f64,
    pub min_duration: f64,
    pub poll_interval_ms: u64,
    pub default_backend: Backend,
    pub vlc_url: String,
    pub vlc_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repeat_count: 3,
            shadowing_time: 1.0,
            min_duration: 0.0,
            poll_interval_ms: 300,
            default_backend: Backend::default(),
            vlc_url: "http://127.0.0.1:8080".to_string(),
            vlc_password: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(count) = std::env::var("SHADOWING_REPEAT_COUNT") {
            if let Ok(c) = count.parse() {
                self.repeat_count = c;
            }
        }
        if let Ok(time) = std::env::var("SHADOWING_TIME") {
            if let Ok(t) = time.parse() {
                self.shadowing_time = t;
            }
        }
        if let Ok(min) = std::env::var("SHADOWING_MIN_DURATION") {
            if let Ok(m) = min.parse() {
                self.min_duration = m;
            }
        }
        if let Ok(poll) = std::env::var("SHADOWING_POLL_MS") {
            if let Ok(p) = poll.parse() {
                self.poll_interval_ms = p;
            }
        }
        if let Ok(backend) = std::env::var("SHADOWING_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.default_backend = b;
            }
        }
        if let Ok(url) = std::env::var("VLC_URL") {
            self.vlc_url = url;
        }
        if let Ok(password) = std::env::var("VLC_PASSWORD") {
            self.vlc_password = Some(password);
        }
    }

    pub fn validate(&self, backend: Backend) -> Result<()> {
        self.settings().validate()?;

        if self.poll_interval_ms == 0 {
            return Err(ShadowError::Config(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if backend == Backend::Vlc && self.vlc_password.is_none() {
            return Err(ShadowError::Config(
                "VLC_PASSWORD not set. Start VLC with --http-password and export it".to_string(),
            ));
        }

        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            repeat_count: self.repeat_count,
            shadowing_time: self.shadowing_time,
            min_duration: self.min_duration,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()
            .ok_or_else(|| ShadowError::Config("No config directory on this platform".to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ShadowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("shadowing").join("config.toml"))
    }
}

pub fn validate_repeat_count(count: u32) -> Result<()> {
    if !REPEAT_COUNT_RANGE.contains(&count) {
        return Err(ShadowError::Config(format!(
            "Repeat count must be between {} and {}, got {}",
            REPEAT_COUNT_RANGE.start(),
            REPEAT_COUNT_RANGE.end(),
            count
        )));
    }
    Ok(())
}

pub fn validate_shadowing_time(time: f64) -> Result<()> {
    if !SHADOWING_TIME_RANGE.contains(&time) {
        return Err(ShadowError::Config(format!(
            "Shadowing time must be between {} and {}, got {}",
            SHADOWING_TIME_RANGE.start(),
            SHADOWING_TIME_RANGE.end(),
            time
        )));
    }
    Ok(())
}

pub fn validate_min_duration(min: f64) -> Result<()> {
    if !min.is_finite() || min < 0.0 {
        return Err(ShadowError::Config(format!(
            "Minimum duration must be a non-negative number of seconds, got {}",
            min
        )));
    }
    Ok(())
}
