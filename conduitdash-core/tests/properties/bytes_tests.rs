//! Property-based tests for the byte-quantity codec

use conduitdash_core::monitoring::{format_bytes, parse_bytes};
use proptest::prelude::*;

// ========== Strategies ==========

/// Byte counts spread over every unit, not just small values
fn arb_byte_count() -> impl Strategy<Value = u64> {
    prop_oneof![
        0u64..1024,
        1024u64..(1 << 20),
        (1u64 << 20)..(1 << 40),
        (1u64 << 40)..(1 << 62),
        Just(u64::MAX),
    ]
}

fn arb_unit() -> impl Strategy<Value = (&'static str, u32)> {
    prop_oneof![
        Just(("B", 0)),
        Just(("KB", 1)),
        Just(("MB", 2)),
        Just(("GB", 3)),
        Just(("TB", 4)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Formatting keeps one decimal, so parsing it back stays within 5%
    #[test]
    fn prop_round_trip_within_rounding(bytes in arb_byte_count()) {
        let text = format_bytes(bytes);
        let back = parse_bytes(&text);
        let diff = back.abs_diff(bytes);
        prop_assert!(diff <= bytes / 20 + 1, "{bytes} -> {text} -> {back}");
    }

    #[test]
    fn prop_units_are_case_insensitive(whole in 0u32..1000, tenth in 0u32..10, (unit, _) in arb_unit()) {
        let upper = format!("{whole}.{tenth} {unit}");
        let lower = upper.to_lowercase();
        prop_assert_eq!(parse_bytes(&upper), parse_bytes(&lower));
    }

    #[test]
    fn prop_integer_quantities_are_exact(n in 0u64..1024, (unit, exp) in arb_unit()) {
        let expected = n * 1024u64.pow(exp);
        prop_assert_eq!(parse_bytes(&format!("{n} {unit}")), expected);
        prop_assert_eq!(parse_bytes(&format!("{n}{unit}")), expected);
    }

    #[test]
    fn prop_parse_never_panics(text in ".{0,40}") {
        let _ = parse_bytes(&text);
    }

    #[test]
    fn prop_format_is_monotonic_in_unit(a in arb_byte_count(), b in arb_byte_count()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(parse_bytes(&format_bytes(lo)) <= parse_bytes(&format_bytes(hi)));
    }
}

#[test]
fn test_reference_round_trips() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023.0 B");
    assert_eq!(format_bytes(1024), "1.0 KB");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(1_099_511_627_776), "1.0 TB");
    for bytes in [0, 1023, 1024, 1536, 1_099_511_627_776] {
        assert_eq!(parse_bytes(&format_bytes(bytes)), bytes);
    }
}
