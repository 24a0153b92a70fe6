use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Sampling parameters and credentials applied to every completion
/// request, persisted as pretty-printed JSON in `config.json`.
///
/// Fields missing from the file fall back to the compiled-in defaults,
/// so configs written by earlier releases keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: i32,
    pub presence_penalty: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: "YOUR_API_KEY_HERE".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 0.95,
            frequency_penalty: 0,
            presence_penalty: 0,
        }
    }
}

/// Get a user-friendly display string for a path, using ~ notation on
/// Unix-like systems when possible.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid JSON.
    Parse {
        /// Path to the configuration file with invalid JSON.
        path: PathBuf,
        /// The JSON deserialization error.
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    path_display(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path_display(path),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            let config: Config =
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Load the config, falling back to defaults when the file is
    /// unreadable or malformed. Startup is never fatal on a bad config.
    pub fn load_or_default(config_path: &Path) -> Config {
        match Self::load_from_path(config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e}; continuing with defaults");
                Config::default()
            }
        }
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_config_yields_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nonexistent_config.json");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");

        assert_eq!(config, Config::default());
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.max_tokens, 2048);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");

        let config = Config {
            api_key: "sk-test".to_string(),
            model: "deepseek-reasoner".to_string(),
            temperature: 1.2,
            max_tokens: 512,
            top_p: 0.5,
            frequency_penalty: 1,
            presence_penalty: -1,
        };
        config
            .save_to_path(&config_path)
            .expect("Failed to save config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn config_file_is_pretty_printed_json() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");

        Config::default()
            .save_to_path(&config_path)
            .expect("Failed to save config");

        let contents = fs::read_to_string(&config_path).expect("Failed to read config");
        assert!(contents.contains('\n'));
        assert!(contents.contains("\"api_key\""));
        assert!(contents.contains("\"frequency_penalty\""));
    }

    #[test]
    fn partial_config_fills_missing_fields_with_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"api_key": "sk-partial", "max_tokens": 64}"#)
            .expect("Failed to write config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded.api_key, "sk-partial");
        assert_eq!(loaded.max_tokens, 64);
        assert_eq!(loaded.model, "deepseek-chat");
        assert_eq!(loaded.temperature, 0.7);
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, "{not json").expect("Failed to write config");

        assert!(Config::load_from_path(&config_path).is_err());
        assert_eq!(Config::load_or_default(&config_path), Config::default());
    }
}
