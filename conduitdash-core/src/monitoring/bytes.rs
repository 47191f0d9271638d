//! Byte-quantity codec for the text counters printed by the relay service
//!
//! Units are 1024-based and matched case-insensitively. Parsing is lenient:
//! anything unreadable becomes zero rather than an error.

/// Unit suffixes in ascending order of magnitude
const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Returns the multiplier for a unit suffix, or `None` if it is not recognized
fn unit_multiplier(unit: &str) -> Option<f64> {
    UNITS
        .iter()
        .position(|u| u.eq_ignore_ascii_case(unit))
        .map(|exp| 1024_f64.powi(exp as i32))
}

/// Converts a human-readable quantity such as `"1.5 GB"` to bytes
///
/// Empty input and `"N/A"` give 0, as does input without a leading number.
/// An unrecognized unit is ignored and the magnitude is taken as bytes.
#[must_use]
pub fn parse_bytes(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("n/a") {
        return 0;
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let Ok(magnitude) = number.parse::<f64>() else {
        return 0;
    };
    if !magnitude.is_finite() {
        return 0;
    }

    let multiplier = unit_multiplier(unit.trim()).unwrap_or(1.0);
    // f64 -> u64 casts saturate
    (magnitude * multiplier).round() as u64
}

/// Formats a byte count with the largest unit not exceeding it, one decimal
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
