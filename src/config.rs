use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Sync engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the backing folder in object storage
    pub folder_name: String,
    /// Timeout for a single remote read or write, in seconds
    pub request_timeout_secs: u64,
    /// Maximum retries for a transient persist failure
    pub max_write_retries: u32,
    /// Base delay for exponential retry backoff, in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            folder_name: "ClassDesk".to_string(),
            request_timeout_secs: 15,
            max_write_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl SyncConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        // Apply environment variable overrides
        if let Ok(folder) = std::env::var("CLASSDESK_FOLDER_NAME") {
            config.folder_name = folder;
        }
        if let Ok(secs) = std::env::var("CLASSDESK_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.request_timeout_secs = secs;
            }
        }
        if let Ok(retries) = std::env::var("CLASSDESK_MAX_WRITE_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.max_write_retries = retries;
            }
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/classdesk/config.yaml
    pub fn default_config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".config")
            .join("classdesk")
            .join("config.yaml")
    }

    /// Timeout applied to each remote read and write.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff delay before the given retry attempt (1-based).
    pub(crate) fn retry_delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u64 << attempt.saturating_sub(1).min(6);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(multiplier))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.folder_name, "ClassDesk");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.max_write_retries, 3);
    }

    #[test]
    fn test_load_no_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = SyncConfig::load(Some(config_path)).unwrap();
        assert_eq!(config.folder_name, "ClassDesk");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "folder_name: StaffRoom").unwrap();
        writeln!(file, "request_timeout_secs: 30").unwrap();

        let config = SyncConfig::load(Some(config_path)).unwrap();
        assert_eq!(config.folder_name, "StaffRoom");
        assert_eq!(config.request_timeout_secs, 30);
        // Unspecified fields keep defaults
        assert_eq!(config.max_write_retries, 3);
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "folder_name: fromfile").unwrap();

        // Set env var
        std::env::set_var("CLASSDESK_FOLDER_NAME", "fromenv");

        let config = SyncConfig::load(Some(config_path)).unwrap();
        assert_eq!(config.folder_name, "fromenv");

        // Clean up
        std::env::remove_var("CLASSDESK_FOLDER_NAME");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = SyncConfig::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_retry_delay_grows() {
        let config = SyncConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_millis(500));
        assert_eq!(config.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(3), Duration::from_millis(2000));
    }
}
