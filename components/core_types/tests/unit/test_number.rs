//! Unit tests for numeric conversions

use core_types::number::{can_fast_inc_dec, number_to_string, string_to_number, to_int32, to_uint32};

#[test]
fn test_round_trip_formatting() {
    for &d in &[0.1, 1.0 / 3.0, 123.456, 5e-324, 1.7976931348623157e308, -2.5] {
        let s = number_to_string(d);
        assert_eq!(string_to_number(&s), d, "{} formatted as {}", d, s);
    }
}

#[test]
fn test_exponent_thresholds() {
    assert_eq!(number_to_string(1e20), "100000000000000000000");
    assert_eq!(number_to_string(1e21), "1e+21");
    assert_eq!(number_to_string(1e-6), "0.000001");
    assert_eq!(number_to_string(1e-7), "1e-7");
}

#[test]
fn test_shift_operand_truncation() {
    assert_eq!(to_uint32(-1.0) >> 28, 15);
    assert_eq!(to_int32(3.99), 3);
    assert_eq!(to_int32(-3.99), -3);
}

#[test]
fn test_fast_path_guard() {
    assert!(can_fast_inc_dec(1_000_000));
    assert!(!can_fast_inc_dec(i32::MAX));
}
