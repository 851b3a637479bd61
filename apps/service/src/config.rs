use std::{env, fmt, fs, path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to write config file {0}: {1}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorSettings,
    pub database: DatabaseSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self { interval_seconds: 12 * 60 * 60, probe_timeout_seconds: 5, max_concurrent_probes: 16 }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "hostwatch.db".into(), pool_size: 8 }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 5000 }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/hostwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("hostwatch/config.toml"))
}

fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Some(value) = env::var(name).ok().and_then(|raw| raw.trim().parse().ok()) {
        *target = value;
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Interval (s)", &self.monitor.interval_seconds)?;
        write_1(f, "Probe Timeout (s)", &self.monitor.probe_timeout_seconds)?;
        write_1(f, "Max Concurrent Probes", &self.monitor.max_concurrent_probes)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "HTTP")?;
        write_1(f, "Bind Address", &self.http.bind)?;
        write_1(f, "Port", &self.http.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/hostwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| ConfigError::ReadFailed(config_path.clone(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::WriteFailed(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| ConfigError::WriteFailed(path.to_path_buf(), err))
    }

    /// Let the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        env_override("HOSTWATCH_DB", &mut self.database.path);
        env_override("PORT", &mut self.http.port);
        env_override("HOSTWATCH_INTERVAL_SECONDS", &mut self.monitor.interval_seconds);
        env_override("HOSTWATCH_PROBE_TIMEOUT_SECONDS", &mut self.monitor.probe_timeout_seconds);
        env_override("HOSTWATCH_MAX_CONCURRENT_PROBES", &mut self.monitor.max_concurrent_probes);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_TIMEOUT: u64 = 300;

        if self.monitor.interval_seconds == 0 {
            return Err(ConfigError::Invalid("monitor.interval_seconds must be at least 1".into()));
        }
        if !(1..=MAX_TIMEOUT).contains(&self.monitor.probe_timeout_seconds) {
            return Err(ConfigError::Invalid(format!(
                "monitor.probe_timeout_seconds must be between 1 and {MAX_TIMEOUT}"
            )));
        }
        if self.monitor.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid("monitor.max_concurrent_probes must be at least 1".into()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid("database.pool_size must be at least 1".into()));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.path cannot be empty".into()));
        }
        Ok(())
    }
}
