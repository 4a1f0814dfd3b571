//! Error types for configuration, scanning and output.
//!
//! Domain outcomes such as "no AirPods nearby" are not errors here; they are
//! reported as [`crate::models::DecodedStatus`] values. These types cover the
//! failures that stop a cycle (or the process) from producing a record.

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed or is out of range.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the radio boundary.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The adapter is missing or powered off. Scanning cannot succeed until
    /// the user fixes this, so the acquisition loop stops.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// A transient failure talking to bluetoothd.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    /// The scan did not finish within its time box.
    #[error("Scan timed out after {0} ms")]
    Timeout(u128),
}

impl ScanError {
    /// Whether retrying the scan can change the outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::AdapterUnavailable(_))
    }
}

/// Why a single acquisition attempt produced no beacon.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Nothing in the current window passed validation.
    #[error("No AirPods status beacon in range")]
    NoCandidate,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl AcquireError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquireError::NoCandidate => true,
            AcquireError::Scan(e) => !e.is_fatal(),
        }
    }

    /// Level to log a failed attempt at. Earbuds out of range is routine.
    pub fn log_level(&self) -> log::Level {
        match self {
            AcquireError::NoCandidate => log::Level::Debug,
            AcquireError::Scan(e) if e.is_fatal() => log::Level::Error,
            AcquireError::Scan(_) => log::Level::Warn,
        }
    }
}

/// Errors raised while writing a status record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write status output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize status record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_adapter_loss_is_fatal() {
        assert!(ScanError::AdapterUnavailable("powered off".into()).is_fatal());
        assert!(!ScanError::Timeout(5250).is_fatal());
    }

    #[test]
    fn test_missing_beacon_logs_quietly() {
        assert_eq!(AcquireError::NoCandidate.log_level(), log::Level::Debug);
        assert_eq!(
            AcquireError::Scan(ScanError::Timeout(5250)).log_level(),
            log::Level::Warn
        );
        assert_eq!(
            AcquireError::Scan(ScanError::AdapterUnavailable("off".into())).log_level(),
            log::Level::Error
        );
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::InvalidValue {
            key: "MIN_RSSI".into(),
            value: "loud".into(),
            reason: "expected an integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value 'loud' for MIN_RSSI: expected an integer"
        );
    }
}
