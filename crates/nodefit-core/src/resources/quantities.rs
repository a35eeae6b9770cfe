use crate::resources::names::CPU;
use crate::{NodefitError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Binary suffixes as powers of two
const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// Decimal SI suffixes as powers of ten
const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Parse a quantity into whole units, rounding up (e.g., "128Mi", "1G", "0.5")
pub fn parse_value(s: &str) -> Option<i64> {
    parse_scaled(s, 1)
}

/// Parse a quantity into thousandths of a unit, rounding up (e.g., "100m", "2", "0.5")
pub fn parse_milli_value(s: &str) -> Option<i64> {
    parse_scaled(s, 1000)
}

/// Parse the quantity of a named resource. CPU is expressed in millicores,
/// everything else in whole units. Negative amounts are rejected.
pub fn parse_resource(name: &str, quantity: &Quantity) -> Result<i64> {
    let parsed = if name == CPU {
        parse_milli_value(&quantity.0)
    } else {
        parse_value(&quantity.0)
    };
    parsed
        .filter(|value| *value >= 0)
        .ok_or_else(|| NodefitError::invalid_quantity(name, quantity.0.clone()))
}

fn parse_scaled(s: &str, scale: i128) -> Option<i64> {
    let s = s.trim();
    let (negative, s) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if int_part.len() + frac_part.len() > 30 {
        return None;
    }

    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        mantissa = mantissa * 10 + i128::from(c.to_digit(10)?);
    }

    let (shift, exp10) = parse_suffix(suffix)?;

    let mut numerator = mantissa.checked_mul(scale)?.checked_mul(1i128 << shift)?;
    let mut denominator = 10i128.checked_pow(frac_part.len() as u32)?;
    if exp10 >= 0 {
        numerator = numerator.checked_mul(10i128.checked_pow(exp10 as u32)?)?;
    } else {
        denominator = denominator.checked_mul(10i128.checked_pow(exp10.unsigned_abs())?)?;
    }

    // Round up like the API machinery does for Value()/MilliValue()
    let mut value = numerator / denominator;
    if numerator % denominator != 0 {
        value += 1;
    }
    if negative {
        value = -value;
    }
    i64::try_from(value).ok()
}

/// Returns (power of two, power of ten) for a suffix
fn parse_suffix(suffix: &str) -> Option<(u32, i32)> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((*shift, 0));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((0, *exp));
    }
    // Exponent notation: "1e3", "5E-1"
    let exponent = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    if exponent.is_empty() {
        return None;
    }
    let exp: i32 = exponent.parse().ok()?;
    if exp.abs() > 30 {
        return None;
    }
    Some((0, exp))
}
