//! Program configuration read from the environment.
//!
//! | Variable              | Meaning                          | Default                  |
//! |-----------------------|----------------------------------|--------------------------|
//! | `TASKLIST_API_URL`    | Base URL of the task API         | [`DEFAULT_BASE_URL`]     |
//! | `TASKLIST_FRAME_RATE` | Redraws per second               | 30                       |
//! | `TASKLIST_LOG`        | File that receives the log       | unset: logging disabled  |

use std::path::PathBuf;

use url::Url;

use crate::api::{ClientConfig, DEFAULT_BASE_URL};

pub const API_URL_VAR: &str = "TASKLIST_API_URL";
pub const FRAME_RATE_VAR: &str = "TASKLIST_FRAME_RATE";
pub const LOG_VAR: &str = "TASKLIST_LOG";

pub const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TASKLIST_API_URL is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("TASKLIST_FRAME_RATE must be a positive integer, got {0:?}")]
    InvalidFrameRate(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ClientConfig,
    pub frame_rate: u32,
    /// `None` disables logging.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ClientConfig::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            log_file: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var(API_URL_VAR) {
            config.api = ClientConfig::new(Url::parse(url.trim())?);
        }

        if let Some(rate) = var(FRAME_RATE_VAR) {
            config.frame_rate = rate
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|rate| *rate > 0)
                .ok_or(ConfigError::InvalidFrameRate(rate))?;
        }

        config.log_file = var(LOG_VAR).map(PathBuf::from);

        Ok(config)
    }

    #[must_use]
    pub fn is_default_api(&self) -> bool {
        self.api.base_url.as_str().trim_end_matches('/') == DEFAULT_BASE_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).expect("valid config");
        assert!(config.is_default_api());
        assert_eq!(config.frame_rate, DEFAULT_FRAME_RATE);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_VAR, "http://localhost:8080/api"),
            (FRAME_RATE_VAR, "60"),
            (LOG_VAR, "/tmp/tasklist.log"),
        ]))
        .expect("valid config");

        assert_eq!(config.api.base_url.as_str(), "http://localhost:8080/api");
        assert!(!config.is_default_api());
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/tasklist.log")));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_lookup(lookup(&[(API_URL_VAR, ""), (LOG_VAR, "  ")])).expect("valid config");
        assert!(config.is_default_api());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_invalid_url() {
        let err = Config::from_lookup(lookup(&[(API_URL_VAR, "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_invalid_frame_rate() {
        for bad in ["0", "-5", "fast"] {
            let err = Config::from_lookup(lookup(&[(FRAME_RATE_VAR, bad)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidFrameRate(ref v) if v == bad), "{bad}");
        }
    }
}
