//! Datacap unit conversion
//!
//! Converts between human-readable quantities ("5TiB", "100 PiB") and raw
//! byte counts. All arithmetic is exact integer arithmetic on `u128`;
//! fractional inputs are floored to whole bytes, never rounded up.
//!
//! Display strings pick the largest unit whose value is at least one and
//! truncate to a single decimal digit. That display form is lossy for
//! arbitrary input but round-trips for every string this module renders.

use std::fmt;
use std::str::FromStr;

use crate::error::UnitError;

const DECIMAL_UNITS: [(&str, u128); 9] = [
    ("B", 1),
    ("KB", 1_000),
    ("MB", 1_000_000),
    ("GB", 1_000_000_000),
    ("TB", 1_000_000_000_000),
    ("PB", 1_000_000_000_000_000),
    ("EB", 1_000_000_000_000_000_000),
    ("ZB", 1_000_000_000_000_000_000_000),
    ("YB", 1_000_000_000_000_000_000_000_000),
];

const BINARY_UNITS: [(&str, u128); 9] = [
    ("B", 1),
    ("KiB", 1 << 10),
    ("MiB", 1 << 20),
    ("GiB", 1 << 30),
    ("TiB", 1 << 40),
    ("PiB", 1 << 50),
    ("EiB", 1 << 60),
    ("ZiB", 1 << 70),
    ("YiB", 1 << 80),
];

/// Subtracted before re-scaling a value that lands in the top binary unit
const YIB_CORRECTION: u128 = 32;

/// A datacap amount: canonical byte count plus the base it is displayed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatacapQuantity {
    pub bytes: u128,
    pub binary: bool,
}

impl DatacapQuantity {
    pub fn new(bytes: u128, binary: bool) -> Self {
        Self { bytes, binary }
    }
}

impl FromStr for DatacapQuantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        let split = normalized
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(normalized.len());
        let (number, unit) = normalized.split_at(split);

        let multiplier = unit_multiplier(unit)
            .ok_or_else(|| UnitError::Parse(format!("unknown unit '{}' in '{}'", unit, s)))?;
        let bytes = scale_decimal(number, multiplier, s)?;

        Ok(Self {
            bytes,
            binary: unit.contains('i'),
        })
    }
}

impl fmt::Display for DatacapQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&from_bytes(self.bytes, self.binary))
    }
}

/// Parse a human-readable quantity into a byte count
///
/// Suffix letters are normalized with a fixed table before lookup:
/// `t` → `T`, `b` → `B`, `p` → `P`, `I` → `i`. Whitespace is ignored.
pub fn to_bytes(quantity: &str) -> Result<u128, UnitError> {
    Ok(quantity.parse::<DatacapQuantity>()?.bytes)
}

/// Render a byte count with the largest fitting unit, one truncated decimal
pub fn from_bytes(bytes: u128, prefer_binary: bool) -> String {
    let units: &[(&str, u128)] = if prefer_binary {
        &BINARY_UNITS
    } else {
        &DECIMAL_UNITS
    };

    let mut value = bytes;
    let (mut symbol, mut size) = pick_unit(value, units);
    if prefer_binary && symbol == "YiB" {
        value = bytes.saturating_sub(YIB_CORRECTION);
        (symbol, size) = pick_unit(value, units);
    }

    // The +9 absorbs the sub-byte remainder left by flooring on parse, so a
    // rendered "1.3TiB" parses and renders back to "1.3TiB".
    let (whole, tenth) = match value.checked_mul(10).and_then(|v| v.checked_add(9)) {
        Some(tenths) if size >= 10 => {
            let n = tenths / size;
            (n / 10, n % 10)
        }
        _ => (value / size, (value % size) * 10 / size),
    };
    if tenth == 0 {
        format!("{}{}", whole, symbol)
    } else {
        format!("{}.{}{}", whole, tenth, symbol)
    }
}

/// Whether a quantity string is expressed in a binary (`…iB`) unit
pub fn is_binary(quantity: &str) -> bool {
    normalize(quantity).contains('i')
}

/// `total * percentage / 100`, rendered in the same base as `total`
pub fn percentage_of(percentage: &str, total: &str) -> Result<String, UnitError> {
    let total = total.parse::<DatacapQuantity>()?;
    let (numerator, denominator) = parse_decimal_fraction(percentage.trim(), percentage)?;

    let scaled = total
        .bytes
        .checked_mul(numerator)
        .ok_or_else(|| UnitError::Overflow(format!("{}% of {}", percentage, total.bytes)))?;
    let divisor = denominator
        .checked_mul(100)
        .ok_or_else(|| UnitError::Overflow(percentage.to_string()))?;

    Ok(from_bytes(scaled / divisor, total.binary))
}

/// Reject `requested` when it exceeds `total_budget`; otherwise return the
/// canonical rendering of `requested`
pub fn validate_within_budget(requested: &str, total_budget: &str) -> Result<String, UnitError> {
    let req = requested.parse::<DatacapQuantity>()?;
    let budget = total_budget.parse::<DatacapQuantity>()?;

    if req.bytes > budget.bytes {
        return Err(UnitError::ExceedsBudget {
            requested: requested.to_string(),
            budget: total_budget.to_string(),
        });
    }

    Ok(req.to_string())
}

/// Datacap shown as "used" on the allocation progress bar
///
/// Treats the remaining allowance as the unused part of the last
/// allocation. This is a display heuristic, not an accounting rule.
pub fn used_datacap(allocation_amount: u128, allowance: u128) -> u128 {
    if allocation_amount < allowance {
        0
    } else {
        allocation_amount - allowance
    }
}

/// Whole-percent progress of `used` against `total`, capped at 100
pub fn allocation_progress(used: u128, total: u128) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = used.saturating_mul(100) / total;
    pct.min(100) as u8
}

fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            't' => 'T',
            'b' => 'B',
            'p' => 'P',
            'I' => 'i',
            other => other,
        })
        .collect()
}

fn unit_multiplier(unit: &str) -> Option<u128> {
    if unit == "kB" {
        return Some(1_000);
    }
    DECIMAL_UNITS
        .iter()
        .chain(BINARY_UNITS.iter())
        .find(|(symbol, _)| *symbol == unit)
        .map(|(_, size)| *size)
}

fn pick_unit<'a>(bytes: u128, units: &'a [(&'a str, u128)]) -> (&'a str, u128) {
    units
        .iter()
        .rev()
        .find(|(_, size)| bytes >= *size)
        .copied()
        .unwrap_or(units[0])
}

/// Split "12.345" into (12345, 1000)
fn parse_decimal_fraction(number: &str, original: &str) -> Result<(u128, u128), UnitError> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };

    let valid = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part) {
        return Err(UnitError::Parse(format!("invalid number in '{}'", original)));
    }

    let digits = format!("{}{}", int_part, frac_part);
    let numerator = digits
        .parse::<u128>()
        .map_err(|_| UnitError::Overflow(original.to_string()))?;
    let denominator = 10u128
        .checked_pow(frac_part.len() as u32)
        .ok_or_else(|| UnitError::Overflow(original.to_string()))?;

    Ok((numerator, denominator))
}

fn scale_decimal(number: &str, multiplier: u128, original: &str) -> Result<u128, UnitError> {
    let (numerator, denominator) = parse_decimal_fraction(number, original)?;
    let whole = numerator / denominator;
    let frac = numerator % denominator;

    let overflow = || UnitError::Overflow(original.to_string());
    let whole_bytes = whole.checked_mul(multiplier).ok_or_else(overflow)?;
    let frac_bytes = frac.checked_mul(multiplier).ok_or_else(overflow)? / denominator;
    whole_bytes.checked_add(frac_bytes).ok_or_else(overflow)
}
