use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use bluer::Address;
use serde::Serialize;
use time::OffsetDateTime;

use crate::utils::format_datetime;

/// One advertisement as yielded by the radio scan.
#[derive(Debug, Clone)]
pub struct RawAdvertisement {
    pub address: Address,
    pub rssi: i16,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Monotonic receive time, used for window expiry.
    pub observed_at: Instant,
}

/// Manufacturer payload re-encoded as a lowercase ASCII hex string.
///
/// Only ever holds hex digits, so per-digit decoding cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPayload(String);

impl HexPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let hex = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        HexPayload(hex)
    }

    /// Accepts an already-encoded hex string, rejecting any non-hex character.
    pub fn parse(hex: &str) -> Option<Self> {
        if hex.bytes().all(|c| c.is_ascii_hexdigit()) {
            Some(HexPayload(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Character at a hex-digit index. Panics past the end, callers decode
    /// validated payloads only.
    pub fn char_at(&self, index: usize) -> u8 {
        self.0.as_bytes()[index]
    }
}

impl fmt::Display for HexPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    AirPods1,
    AirPods2,
    AirPods3,
    AirPodsPro,
    AirPodsPro2,
    AirPodsMax,
}

impl Model {
    pub fn name(&self) -> &'static str {
        match self {
            Model::AirPods1 => "AirPods 1",
            Model::AirPods2 => "AirPods 2",
            Model::AirPods3 => "AirPods 3",
            Model::AirPodsPro => "AirPods Pro",
            Model::AirPodsPro2 => "AirPods Pro 2",
            Model::AirPodsMax => "AirPods Max",
        }
    }
}

/// Battery percentages. Each is -1 (unavailable) or 5..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeLevels {
    pub left: i16,
    pub right: i16,
    pub case: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChargingFlags {
    pub left: bool,
    pub right: bool,
    pub case: bool,
}

/// A fully decoded beacon from a recognised model.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryReport {
    pub model: Model,
    pub charge: ChargeLevels,
    pub charging: ChargingFlags,
    pub captured_at: OffsetDateTime,
    pub raw: HexPayload,
}

/// Outcome of one acquisition cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedStatus {
    Found(BatteryReport),
    NotFound {
        captured_at: OffsetDateTime,
    },
    UnknownModel {
        raw: HexPayload,
        captured_at: OffsetDateTime,
    },
    AdapterError {
        captured_at: OffsetDateTime,
    },
}

pub const NOT_FOUND_MODEL: &str = "AirPods not found";
pub const UNKNOWN_MODEL: &str = "Unknown Model";
pub const ADAPTER_ERROR_MODEL: &str = "Bluetooth adapter unavailable";

impl DecodedStatus {
    /// Numeric status written to the sink: 1 found, 0 not found, -1 no adapter.
    pub fn status_code(&self) -> i8 {
        match self {
            DecodedStatus::Found(_) => 1,
            DecodedStatus::NotFound { .. } | DecodedStatus::UnknownModel { .. } => 0,
            DecodedStatus::AdapterError { .. } => -1,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            DecodedStatus::Found(report) => report.model.name(),
            DecodedStatus::NotFound { .. } => NOT_FOUND_MODEL,
            DecodedStatus::UnknownModel { .. } => UNKNOWN_MODEL,
            DecodedStatus::AdapterError { .. } => ADAPTER_ERROR_MODEL,
        }
    }

    pub fn captured_at(&self) -> OffsetDateTime {
        match self {
            DecodedStatus::Found(report) => report.captured_at,
            DecodedStatus::NotFound { captured_at }
            | DecodedStatus::UnknownModel { captured_at, .. }
            | DecodedStatus::AdapterError { captured_at } => *captured_at,
        }
    }

    /// Flatten into the JSON shape consumers read.
    pub fn to_record(&self) -> StatusRecord {
        let mut record = StatusRecord {
            status: self.status_code(),
            charge: None,
            charging_left: None,
            charging_right: None,
            charging_case: None,
            model: self.model_name().to_string(),
            date: format_datetime(&self.captured_at()),
            raw: None,
        };

        match self {
            DecodedStatus::Found(report) => {
                record.charge = Some(report.charge);
                record.charging_left = Some(report.charging.left);
                record.charging_right = Some(report.charging.right);
                record.charging_case = Some(report.charging.case);
                record.raw = Some(report.raw.to_string());
            }
            DecodedStatus::UnknownModel { raw, .. } => {
                record.raw = Some(raw.to_string());
            }
            DecodedStatus::NotFound { .. } | DecodedStatus::AdapterError { .. } => {}
        }

        record
    }
}

/// Wire form of a [`DecodedStatus`], one JSON object per line.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub status: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<ChargeLevels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_left: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_right: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_case: Option<bool>,
    pub model: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_hex_payload_from_bytes() {
        let hex = HexPayload::from_bytes(&[0x07, 0x19, 0x01, 0x0e, 0xff]);
        assert_eq!(hex.as_str(), "0719010eff");
        assert_eq!(hex.len(), 10);
        assert_eq!(hex.char_at(7), b'e');
        assert!(!hex.is_empty());
        assert!(HexPayload::from_bytes(&[]).is_empty());
    }

    #[test]
    fn test_hex_payload_parse_rejects_non_hex() {
        assert!(HexPayload::parse("07zz").is_none());
        assert_eq!(HexPayload::parse("0A1F").unwrap().as_str(), "0a1f");
    }

    #[test]
    fn test_found_record_shape() {
        let status = DecodedStatus::Found(BatteryReport {
            model: Model::AirPodsPro,
            charge: ChargeLevels {
                left: 45,
                right: 100,
                case: 85,
            },
            charging: ChargingFlags {
                left: true,
                right: false,
                case: false,
            },
            captured_at: datetime!(2024-03-01 12:30:05 UTC),
            raw: HexPayload::parse("0719").unwrap(),
        });

        let json = serde_json::to_string(&status.to_record()).unwrap();
        assert_eq!(
            json,
            r#"{"status":1,"charge":{"left":45,"right":100,"case":85},"charging_left":true,"charging_right":false,"charging_case":false,"model":"AirPods Pro","date":"2024-03-01 12:30:05","raw":"0719"}"#
        );
    }

    #[test]
    fn test_unknown_model_record_shape() {
        let status = DecodedStatus::UnknownModel {
            raw: HexPayload::parse("07190b").unwrap(),
            captured_at: datetime!(2024-03-01 12:30:05 UTC),
        };

        let json = serde_json::to_string(&status.to_record()).unwrap();
        assert_eq!(
            json,
            r#"{"status":0,"model":"Unknown Model","date":"2024-03-01 12:30:05","raw":"07190b"}"#
        );
    }

    #[test]
    fn test_not_found_record_omits_battery_fields() {
        let status = DecodedStatus::NotFound {
            captured_at: datetime!(2024-03-01 08:00:00 UTC),
        };

        let json = serde_json::to_string(&status.to_record()).unwrap();
        assert_eq!(
            json,
            r#"{"status":0,"model":"AirPods not found","date":"2024-03-01 08:00:00"}"#
        );
    }

    #[test]
    fn test_adapter_error_status_code() {
        let status = DecodedStatus::AdapterError {
            captured_at: datetime!(2024-03-01 08:00:00 UTC),
        };
        assert_eq!(status.status_code(), -1);
        assert_eq!(status.model_name(), ADAPTER_ERROR_MODEL);
        assert!(status.to_record().charge.is_none());
    }
}
