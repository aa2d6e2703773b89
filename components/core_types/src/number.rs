//! Numeric conversions shared by the interpreter and the object model.
//!
//! Numbers are IEEE doubles with a tagged 32-bit integer fast representation.
//! These helpers implement the string/number conversions and the integer
//! truncations used by bitwise operators.

/// Returns true if `d` is exactly representable as a tagged integer.
///
/// Negative zero is not: it must stay a double so that `1 / -0` is `-Infinity`.
pub fn as_tagged_int(d: f64) -> Option<i32> {
    if d.fract() == 0.0 && d >= i32::MIN as f64 && d <= i32::MAX as f64 {
        if d == 0.0 && d.is_sign_negative() {
            return None;
        }
        Some(d as i32)
    } else {
        None
    }
}

/// Returns true if a ±2 step from `n` cannot leave the tagged integer range.
///
/// The increment/decrement fast path only applies to such values; all others
/// go through full numeric promotion.
pub fn can_fast_inc_dec(n: i32) -> bool {
    n > i32::MIN + 1 && n < i32::MAX - 1
}

/// ToInt32: modular truncation to a signed 32-bit integer.
pub fn to_int32(d: f64) -> i32 {
    to_uint32(d) as i32
}

/// ToUint32: modular truncation to an unsigned 32-bit integer.
pub fn to_uint32(d: f64) -> u32 {
    if !d.is_finite() {
        return 0;
    }
    let m = d.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// StringToNumber: parses a numeric string the way the language's `Number(s)`
/// conversion does. Unparseable input yields NaN; empty or blank input yields 0.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return 0.0;
    }

    let radix_digits = |prefix_len: usize, radix: u32| -> f64 {
        let digits = &t[prefix_len..];
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut acc = 0.0f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(v) => acc = acc * radix as f64 + v as f64,
                None => return f64::NAN,
            }
        }
        acc
    };

    let lower = t.get(..2).map(|p| p.to_ascii_lowercase());
    match lower.as_deref() {
        Some("0x") => return radix_digits(2, 16),
        Some("0o") => return radix_digits(2, 8),
        Some("0b") => return radix_digits(2, 2),
        _ => {}
    }

    let (sign, body) = match t.as_bytes()[0] {
        b'+' => (1.0, &t[1..]),
        b'-' => (-1.0, &t[1..]),
        _ => (1.0, t),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if !is_decimal_literal(body) {
        return f64::NAN;
    }
    match body.parse::<f64>() {
        Ok(v) => sign * v,
        Err(_) => f64::NAN,
    }
}

/// Checks `digits [. digits] [e [+-] digits]` with at least one mantissa digit.
fn is_decimal_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == bytes.len()
}

/// Number::toString(10): the shortest round-tripping decimal, laid out with
/// the language's rules for when to switch to exponent notation.
pub fn number_to_string(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d == 0.0 {
        return "0".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if let Some(i) = as_tagged_int(d) {
        return i.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let formatted = buffer.format_finite(d.abs());
    let (mantissa, exp) = match formatted.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (formatted, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let all: String = int_part.chars().chain(frac_part.chars()).collect();
    let leading = all.bytes().take_while(|&b| b == b'0').count();
    let digits = all[leading..].trim_end_matches('0');
    // value = 0.digits * 10^n
    let n = int_part.len() as i32 + exp - leading as i32;
    let k = digits.len() as i32;

    let mut out = String::new();
    if d < 0.0 {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        out.push_str(&digits[..n as usize]);
        out.push('.');
        out.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(digits);
    } else {
        let e = n - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    }
    out
}
