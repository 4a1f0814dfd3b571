/// Filtering of advertisements down to plausible AirPods status beacons
use log::debug;

use crate::models::{HexPayload, RawAdvertisement};

// Apple proximity beacon constants
pub const APPLE_MANUFACTURER_ID: u16 = 76; // 0x004C, Apple Inc.
pub const STATUS_PAYLOAD_HEX_LEN: usize = 54; // 27 bytes
pub const DEFAULT_MIN_RSSI: i16 = -60;
pub const DEFAULT_EXCLUDED_PREFIX: &str = "12"; // Non-status broadcast subtype

/// Decides whether a raw advertisement is a status beacon worth decoding
///
/// Checks, in order:
/// - Signal strength is at least `min_rssi`
/// - Apple manufacturer data is present
/// - Hex-encoded payload is exactly 54 characters
/// - Payload does not start with the excluded prefix, when one is set
#[derive(Debug, Clone)]
pub struct BeaconValidator {
    min_rssi: i16,
    excluded_prefix: Option<String>,
}

impl Default for BeaconValidator {
    fn default() -> Self {
        BeaconValidator {
            min_rssi: DEFAULT_MIN_RSSI,
            excluded_prefix: Some(DEFAULT_EXCLUDED_PREFIX.to_string()),
        }
    }
}

impl BeaconValidator {
    pub fn new(min_rssi: i16, excluded_prefix: Option<String>) -> Self {
        BeaconValidator {
            min_rssi,
            excluded_prefix: excluded_prefix
                .map(|p| p.to_ascii_lowercase())
                .filter(|p| !p.is_empty()),
        }
    }

    pub fn min_rssi(&self) -> i16 {
        self.min_rssi
    }

    pub fn is_candidate(&self, ad: &RawAdvertisement) -> bool {
        self.candidate_payload(ad).is_some()
    }

    /// Hex payload of `ad` if it passes every check
    pub fn candidate_payload(&self, ad: &RawAdvertisement) -> Option<HexPayload> {
        if ad.rssi < self.min_rssi {
            debug!(
                "Rejecting {}: RSSI {} below {}",
                ad.address, ad.rssi, self.min_rssi
            );
            return None;
        }

        let data = ad.manufacturer_data.get(&APPLE_MANUFACTURER_ID)?;
        let hex = HexPayload::from_bytes(data);

        if hex.len() != STATUS_PAYLOAD_HEX_LEN {
            debug!(
                "Rejecting {}: payload length {} != {}",
                ad.address,
                hex.len(),
                STATUS_PAYLOAD_HEX_LEN
            );
            return None;
        }

        if let Some(prefix) = &self.excluded_prefix {
            if hex.as_str().starts_with(prefix.as_str()) {
                debug!("Rejecting {}: excluded prefix {}", ad.address, prefix);
                return None;
            }
        }

        Some(hex)
    }
}
