//! Environment configuration
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `CARDS_DEFAULT_TZ` | `UTC` | IANA zone used when a request names none |
//! | `CARDS_DATA_PATH` | unset | JSON array or NDJSON file of daily rows |
//! | `CARDS_INTRADAY_PATH` | unset | Intraday snapshots overlaid on today |
//! | `CARDS_INTRADAY_TODAY` | `false` | Enable the intraday overlay |
//!
//! Invalid values are logged and replaced by the default.

use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;

use crate::connector::{load_rows, MemoryRowSource};
use crate::error::SourceError;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) if val.trim().is_empty() => None,
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub default_timezone: Tz,
    pub data_path: Option<PathBuf>,
    pub intraday_path: Option<PathBuf>,
    pub intraday_today: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            data_path: None,
            intraday_path: None,
            intraday_today: false,
        }
    }
}

impl KernelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_timezone: parse_env_or("CARDS_DEFAULT_TZ", defaults.default_timezone),
            data_path: parse_env_opt("CARDS_DATA_PATH"),
            intraday_path: parse_env_opt("CARDS_INTRADAY_PATH"),
            intraday_today: parse_env_or("CARDS_INTRADAY_TODAY", defaults.intraday_today),
        }
    }

    /// Load the configured files into a memory source.
    ///
    /// `data_path` overrides the configured daily file.
    pub fn load_source(&self, data_path: Option<&PathBuf>) -> Result<MemoryRowSource, SourceError> {
        let path = data_path.or(self.data_path.as_ref()).ok_or_else(|| {
            SourceError::Unavailable("no data file configured (set CARDS_DATA_PATH or pass --data)".to_string())
        })?;
        let daily = load_rows(path)?;

        let intraday = match &self.intraday_path {
            Some(path) => load_rows(path)?,
            None => Vec::new(),
        };
        tracing::debug!(daily = daily.len(), intraday = intraday.len(), "loaded rows");

        Ok(MemoryRowSource::new(daily).with_intraday(intraday))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "CARDS_DEFAULT_TZ",
            "CARDS_DATA_PATH",
            "CARDS_INTRADAY_PATH",
            "CARDS_INTRADAY_TODAY",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        let config = KernelConfig::from_env();
        assert_eq!(config, KernelConfig::default());
        assert_eq!(config.default_timezone, Tz::UTC);
    }

    #[test]
    fn test_from_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("CARDS_DEFAULT_TZ", "America/Chicago");
        env::set_var("CARDS_DATA_PATH", "/var/lib/cards/rows.ndjson");
        env::set_var("CARDS_INTRADAY_TODAY", "true");

        let config = KernelConfig::from_env();
        assert_eq!(config.default_timezone, chrono_tz::America::Chicago);
        assert_eq!(config.data_path, Some(PathBuf::from("/var/lib/cards/rows.ndjson")));
        assert_eq!(config.intraday_path, None);
        assert!(config.intraday_today);

        clear_env();
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("CARDS_DEFAULT_TZ", "Mars/Olympus");
        env::set_var("CARDS_INTRADAY_TODAY", "sometimes");

        let config = KernelConfig::from_env();
        assert_eq!(config.default_timezone, Tz::UTC);
        assert!(!config.intraday_today);

        clear_env();
    }

    #[test]
    fn test_load_source_without_path() {
        let err = KernelConfig::default().load_source(None).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
