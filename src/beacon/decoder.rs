/// AirPods status beacon decoding
use time::OffsetDateTime;

use crate::models::{
    BatteryReport, ChargeLevels, ChargingFlags, DecodedStatus, HexPayload, Model,
};
use crate::utils::now_local;

// Hex-digit positions inside the 54-character payload
const MODEL_INDEX: usize = 7;
const FLIP_INDEX: usize = 10;
const POD_A_BATTERY_INDEX: usize = 12;
const POD_B_BATTERY_INDEX: usize = 13;
const CHARGING_INDEX: usize = 14;
const CASE_BATTERY_INDEX: usize = 15;

const FLIP_MASK: u8 = 0x02;
const CHARGING_POD_A: u8 = 0b0010;
const CHARGING_POD_B: u8 = 0b0001;
const CHARGING_CASE: u8 = 0b0100;

pub const BATTERY_UNAVAILABLE: i16 = -1;

/// Model code (hex digit at index 7) to model. Add a row to support a new model.
pub const MODEL_TABLE: &[(u8, Model)] = &[
    (b'e', Model::AirPodsPro),
    (b'f', Model::AirPods2),
    (b'2', Model::AirPods1),
    (b'a', Model::AirPodsMax),
    (b'4', Model::AirPodsPro2),
    (b'3', Model::AirPods3),
];

pub fn lookup_model(code: u8) -> Option<Model> {
    let code = code.to_ascii_lowercase();
    MODEL_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, model)| *model)
}

/// Value of a single hex digit character, 0..=15
pub fn parse_hex_digit(c: u8) -> u8 {
    // HexPayload only holds hex digits
    (c as char).to_digit(16).map_or(0, |d| d as u8)
}

/// Battery nibble to percentage: 0..=9 map to 5..=95, 10 is full, above is unavailable
pub fn battery_percentage(digit: u8) -> i16 {
    match digit {
        10 => 100,
        0..=9 => digit as i16 * 10 + 5,
        _ => BATTERY_UNAVAILABLE,
    }
}

/// Whether left and right are swapped in the payload
pub fn is_flipped(hex: &HexPayload) -> bool {
    parse_hex_digit(hex.char_at(FLIP_INDEX)) & FLIP_MASK == 0
}

/// Decode a validated 54-character status payload, stamped with the current time
pub fn decode(hex: &HexPayload) -> DecodedStatus {
    decode_at(hex, now_local())
}

/// Decode a validated status payload
///
/// Payload layout, as hex-digit indices:
/// - 7: Model code (see `MODEL_TABLE`)
/// - 10: Bit 1 clear means left and right are flipped
/// - 12, 13: Earbud battery nibbles (left is 13 unless flipped)
/// - 14: Charging bits (bit 0 left, bit 1 right unless flipped; bit 2 case)
/// - 15: Case battery nibble
///
/// Unknown models short-circuit to `DecodedStatus::UnknownModel` since the
/// battery layout is only known for the listed models.
///
/// # Arguments
/// * `hex` - Payload that passed `BeaconValidator`
/// * `captured_at` - Wall-clock time stamped onto the result
pub fn decode_at(hex: &HexPayload, captured_at: OffsetDateTime) -> DecodedStatus {
    let model = match lookup_model(hex.char_at(MODEL_INDEX)) {
        Some(model) => model,
        None => {
            return DecodedStatus::UnknownModel {
                raw: hex.clone(),
                captured_at,
            }
        }
    };

    let flip = is_flipped(hex);
    let digit = |index: usize| parse_hex_digit(hex.char_at(index));

    let (left_index, right_index) = if flip {
        (POD_A_BATTERY_INDEX, POD_B_BATTERY_INDEX)
    } else {
        (POD_B_BATTERY_INDEX, POD_A_BATTERY_INDEX)
    };

    let charge = ChargeLevels {
        left: battery_percentage(digit(left_index)),
        right: battery_percentage(digit(right_index)),
        case: battery_percentage(digit(CASE_BATTERY_INDEX)),
    };

    let charging_bits = digit(CHARGING_INDEX);
    let (left_mask, right_mask) = if flip {
        (CHARGING_POD_A, CHARGING_POD_B)
    } else {
        (CHARGING_POD_B, CHARGING_POD_A)
    };

    let charging = ChargingFlags {
        left: charging_bits & left_mask != 0,
        right: charging_bits & right_mask != 0,
        case: charging_bits & CHARGING_CASE != 0,
    };

    DecodedStatus::Found(BatteryReport {
        model,
        charge,
        charging,
        captured_at,
        raw: hex.clone(),
    })
}
