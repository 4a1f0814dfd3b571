use log::{debug, info};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::beacon::validator::{DEFAULT_EXCLUDED_PREFIX, DEFAULT_MIN_RSSI};
use crate::beacon::BeaconValidator;
use crate::error::ConfigError;
use crate::sink::{Sink, DEFAULT_MAX_LINES};

#[derive(Debug, Clone)]
pub struct StatusConfig {
    pub min_rssi: i16,
    pub excluded_prefix: Option<String>,
    pub update_interval: Duration,
    pub scan_duration: Duration,
    pub scan_attempts: usize,
    pub retry_delay: Duration,
    pub window_horizon: Duration,
    pub output_file: Option<PathBuf>,
    pub max_lines: usize,
    pub adapter_name: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            min_rssi: DEFAULT_MIN_RSSI,
            excluded_prefix: Some(DEFAULT_EXCLUDED_PREFIX.to_string()),
            update_interval: Duration::from_secs(1),
            scan_duration: Duration::from_millis(5000),
            scan_attempts: 5,
            retry_delay: Duration::from_millis(250),
            window_horizon: Duration::from_secs(10),
            output_file: None,
            max_lines: DEFAULT_MAX_LINES,
            adapter_name: None,
        }
    }
}

impl StatusConfig {
    /// Load from `.env` and the process environment
    ///
    /// The last positional command-line argument, if any, is the output file
    /// and takes precedence over `OUTPUT_FILE`.
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let mut config = Self::from_lookup(|key| env::var(key).ok())?;

        if let Some(path) = env::args().skip(1).last() {
            debug!("Output file from command line: {}", path);
            config.output_file = Some(PathBuf::from(path));
        }

        info!(
            "Configuration: min RSSI {} dBm, excluded prefix {:?}, {} scan attempts, output {}",
            config.min_rssi,
            config.excluded_prefix,
            config.scan_attempts,
            config
                .output_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdout".to_string())
        );

        Ok(config)
    }

    /// Build a config from any key lookup, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StatusConfig::default();

        let excluded_prefix = match lookup("EXCLUDED_PAYLOAD_PREFIX") {
            Some(prefix) => {
                let prefix = prefix.trim().to_ascii_lowercase();
                if !prefix.bytes().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid(
                        "EXCLUDED_PAYLOAD_PREFIX",
                        &prefix,
                        "expected hex digits",
                    ));
                }
                Some(prefix).filter(|p| !p.is_empty())
            }
            None => defaults.excluded_prefix,
        };

        let scan_attempts = parse_or(&lookup, "SCAN_ATTEMPTS", defaults.scan_attempts)?;
        if scan_attempts == 0 {
            return Err(invalid("SCAN_ATTEMPTS", "0", "must be at least 1"));
        }

        let max_lines = parse_or(&lookup, "MAX_LINES_IN_FILE", defaults.max_lines)?;
        if max_lines == 0 {
            return Err(invalid("MAX_LINES_IN_FILE", "0", "must be at least 1"));
        }

        let scan_duration_ms = parse_or(
            &lookup,
            "SCAN_DURATION_MS",
            defaults.scan_duration.as_millis() as u64,
        )?;
        if scan_duration_ms == 0 {
            return Err(invalid("SCAN_DURATION_MS", "0", "must be at least 1"));
        }

        Ok(StatusConfig {
            min_rssi: parse_or(&lookup, "MIN_RSSI", defaults.min_rssi)?,
            excluded_prefix,
            update_interval: Duration::from_secs(parse_or(
                &lookup,
                "UPDATE_INTERVAL_SECS",
                defaults.update_interval.as_secs(),
            )?),
            scan_duration: Duration::from_millis(scan_duration_ms),
            scan_attempts,
            retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )?),
            window_horizon: Duration::from_secs(parse_or(
                &lookup,
                "WINDOW_HORIZON_SECS",
                defaults.window_horizon.as_secs(),
            )?),
            output_file: non_empty(lookup("OUTPUT_FILE")).map(PathBuf::from),
            max_lines,
            adapter_name: non_empty(lookup("BLUETOOTH_ADAPTER")),
        })
    }

    pub fn validator(&self) -> BeaconValidator {
        BeaconValidator::new(self.min_rssi, self.excluded_prefix.clone())
    }

    pub fn sink(&self) -> Sink {
        match &self.output_file {
            Some(path) => Sink::RollingFile {
                path: path.clone(),
                max_lines: self.max_lines,
            },
            None => Sink::Terminal,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| invalid(key, &value, &e.to_string())),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
