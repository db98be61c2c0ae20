//! Conversions between PostgreSQL setting strings and numeric values.
//!
//! Byte-valued settings use the server's size suffixes (`kB`, `MB`, `GB`, `TB`,
//! all powers of 1024). Duration settings use `us`, `ms`, `s`, `min`, `h`, `d`.
//!
//! Canonical forms are what the tuner writes back into `postgresql.conf`: an
//! integer magnitude immediately followed by a unit suffix (`"2GB"`, `"64kB"`,
//! `"15min"`). The decimal forms produced by [`bytes_to_decimal`] are for display
//! only and are never parsed back.

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;
pub const TB: u64 = 1024 * GB;

/// Fractions of a unit smaller than this are dropped instead of forcing a
/// smaller unit.
const FRACTIONAL_CUTOFF: f64 = 0.001;

/// Error returned when a value string fails unit, number or bool parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatError {
    pub input: String,
    pub message: String,
}

impl FormatError {
    pub fn new(input: &str, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for FormatError {}

// ---------------------------------------------------------------------------
// Byte sizes
// ---------------------------------------------------------------------------

/// Size units, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ByteUnit {
    Byte,
    Kilobyte,
    Megabyte,
    Gigabyte,
    Terabyte,
}

impl ByteUnit {
    /// Largest first, the order unit selection walks in.
    const DESCENDING: [ByteUnit; 5] = [
        ByteUnit::Terabyte,
        ByteUnit::Gigabyte,
        ByteUnit::Megabyte,
        ByteUnit::Kilobyte,
        ByteUnit::Byte,
    ];

    pub fn multiplier(self) -> u64 {
        match self {
            ByteUnit::Byte => 1,
            ByteUnit::Kilobyte => KB,
            ByteUnit::Megabyte => MB,
            ByteUnit::Gigabyte => GB,
            ByteUnit::Terabyte => TB,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            ByteUnit::Byte => "B",
            ByteUnit::Kilobyte => "kB",
            ByteUnit::Megabyte => "MB",
            ByteUnit::Gigabyte => "GB",
            ByteUnit::Terabyte => "TB",
        }
    }

    fn smaller(self) -> Option<ByteUnit> {
        match self {
            ByteUnit::Byte => None,
            ByteUnit::Kilobyte => Some(ByteUnit::Byte),
            ByteUnit::Megabyte => Some(ByteUnit::Kilobyte),
            ByteUnit::Gigabyte => Some(ByteUnit::Megabyte),
            ByteUnit::Terabyte => Some(ByteUnit::Gigabyte),
        }
    }

    /// Parses an input suffix. Bare bytes are deliberately not accepted.
    fn from_input_suffix(suffix: &str) -> Option<ByteUnit> {
        match suffix {
            "kB" => Some(ByteUnit::Kilobyte),
            "MB" => Some(ByteUnit::Megabyte),
            "GB" => Some(ByteUnit::Gigabyte),
            "TB" => Some(ByteUnit::Terabyte),
            _ => None,
        }
    }

    /// Largest unit in which `bytes` scales to at least 1.
    fn largest_for(bytes: u64) -> ByteUnit {
        Self::DESCENDING
            .into_iter()
            .find(|u| bytes >= u.multiplier())
            .unwrap_or(ByteUnit::Byte)
    }
}

/// Converts a byte count into the canonical PostgreSQL size string.
///
/// The largest unit with a scaled value of at least 1 is used, unless the value
/// has a fractional part of 0.001 or more in that unit, in which case the next
/// smaller unit is tried. Kilobytes are the floor: anything under 1kB becomes
/// `"1kB"` and kilobyte magnitudes are rounded.
///
/// ```
/// use rpgtune_core::units::{bytes_to_canonical, GB, MB};
///
/// assert_eq!(bytes_to_canonical(2 * GB).unwrap(), "2GB");
/// assert_eq!(bytes_to_canonical(1536 * MB).unwrap(), "1536MB");
/// ```
pub fn bytes_to_canonical(bytes: u64) -> Result<String, FormatError> {
    if bytes == 0 {
        return Err(FormatError::new("0", "zero bytes has no canonical form"));
    }
    if bytes < KB {
        return Ok(format!("1{}", ByteUnit::Kilobyte.suffix()));
    }

    let mut unit = ByteUnit::largest_for(bytes);
    loop {
        let mult = unit.multiplier();
        if unit == ByteUnit::Kilobyte {
            let magnitude = (bytes + KB / 2) / KB;
            return Ok(format!("{}{}", magnitude, unit.suffix()));
        }

        let fraction = (bytes % mult) as f64 / mult as f64;
        if fraction < FRACTIONAL_CUTOFF {
            return Ok(format!("{}{}", bytes / mult, unit.suffix()));
        }

        match unit.smaller() {
            Some(next) => unit = next,
            None => return Ok(format!("{}{}", bytes, unit.suffix())),
        }
    }
}

/// Parses a canonical size string (`<digits><unit>`) into bytes.
///
/// Rejects surrounding whitespace, signs, fractions, bare byte counts, unknown
/// suffixes and values that overflow `u64`.
pub fn canonical_to_bytes(value: &str) -> Result<u64, FormatError> {
    let (magnitude, suffix) = split_magnitude(value)?;

    let unit = ByteUnit::from_input_suffix(suffix).ok_or_else(|| {
        if suffix.is_empty() {
            FormatError::new(value, "missing unit suffix")
        } else {
            FormatError::new(value, format!("unsupported unit '{}'", suffix))
        }
    })?;

    let magnitude: u64 = magnitude
        .parse()
        .map_err(|_| FormatError::new(value, "magnitude overflows"))?;

    magnitude
        .checked_mul(unit.multiplier())
        .ok_or_else(|| FormatError::new(value, "size overflows"))
}

/// Formats bytes with two decimals for display, e.g. `"8.00 GB"`.
pub fn bytes_to_decimal(bytes: u64) -> String {
    let unit = ByteUnit::largest_for(bytes);
    let value = bytes as f64 / unit.multiplier() as f64;
    format!("{:.2} {}", value, unit.suffix())
}

/// Splits `<digits><rest>`, rejecting anything that doesn't start with a digit
/// or continues with a decimal point.
fn split_magnitude(value: &str) -> Result<(&str, &str), FormatError> {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());

    if digits_end == 0 {
        return Err(FormatError::new(value, "expected a non-negative integer"));
    }

    let (magnitude, suffix) = value.split_at(digits_end);
    if suffix.starts_with('.') {
        return Err(FormatError::new(value, "fractional values are not allowed"));
    }
    Ok((magnitude, suffix))
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Duration units, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// Adjacent unit pairs and how many of the smaller fit in the larger.
const TIME_STEPS: [(TimeUnit, TimeUnit, u64); 5] = [
    (TimeUnit::Microseconds, TimeUnit::Milliseconds, 1000),
    (TimeUnit::Milliseconds, TimeUnit::Seconds, 1000),
    (TimeUnit::Seconds, TimeUnit::Minutes, 60),
    (TimeUnit::Minutes, TimeUnit::Hours, 60),
    (TimeUnit::Hours, TimeUnit::Days, 24),
];

impl TimeUnit {
    const DESCENDING: [TimeUnit; 6] = [
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }

    fn from_suffix(suffix: &str) -> Option<TimeUnit> {
        Self::DESCENDING.into_iter().find(|u| u.suffix() == suffix)
    }

    /// Number of microseconds in one of this unit.
    fn micros(self) -> u64 {
        time_ratio(self, TimeUnit::Microseconds) as u64
    }
}

/// How many `to` units make up one `from` unit, composed from [`TIME_STEPS`].
///
/// `time_ratio(Minutes, Milliseconds)` is `60000.0`; the inverse direction
/// yields the reciprocal.
pub fn time_ratio(from: TimeUnit, to: TimeUnit) -> f64 {
    if from == to {
        return 1.0;
    }
    let (low, high) = if from < to { (from, to) } else { (to, from) };

    let steps: u64 = TIME_STEPS
        .iter()
        .filter(|(small, _, _)| *small >= low && *small < high)
        .map(|(_, _, ratio)| *ratio)
        .product();

    if from > to {
        steps as f64
    } else {
        1.0 / steps as f64
    }
}

/// Converts `value` expressed in `from` into `to`.
pub fn convert_time(value: f64, from: TimeUnit, to: TimeUnit) -> f64 {
    value * time_ratio(from, to)
}

/// Converts a duration into its canonical string, choosing the largest unit
/// that keeps an integer magnitude (`900` seconds is `"15min"`, `90` is `"90s"`).
pub fn time_to_canonical(value: u64, unit: TimeUnit) -> Result<String, FormatError> {
    if value == 0 {
        return Err(FormatError::new("0", "zero duration has no canonical form"));
    }
    let total = value
        .checked_mul(unit.micros())
        .ok_or_else(|| FormatError::new(&value.to_string(), "duration overflows"))?;

    for candidate in TimeUnit::DESCENDING {
        let per = candidate.micros();
        if total < per {
            continue;
        }
        let fraction = (total % per) as f64 / per as f64;
        if fraction < FRACTIONAL_CUTOFF {
            return Ok(format!("{}{}", total / per, candidate.suffix()));
        }
    }
    Ok(format!("{}{}", total, TimeUnit::Microseconds.suffix()))
}

/// Parses a canonical duration string (`<digits><unit>`).
pub fn canonical_to_time(value: &str) -> Result<(u64, TimeUnit), FormatError> {
    let (magnitude, suffix) = split_magnitude(value)?;
    let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| {
        if suffix.is_empty() {
            FormatError::new(value, "missing unit suffix")
        } else {
            FormatError::new(value, format!("unsupported unit '{}'", suffix))
        }
    })?;
    let magnitude: u64 = magnitude
        .parse()
        .map_err(|_| FormatError::new(value, "magnitude overflows"))?;
    Ok((magnitude, unit))
}

/// Parses a duration as it may appear in a config file and returns it in
/// `default_unit`. A bare integer is taken to already be in `default_unit`,
/// matching how the server reads unit-less time settings.
pub fn parse_duration(value: &str, default_unit: TimeUnit) -> Result<f64, FormatError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value
            .parse::<u64>()
            .map(|v| v as f64)
            .map_err(|_| FormatError::new(value, "magnitude overflows"));
    }
    let (magnitude, unit) = canonical_to_time(value)?;
    Ok(convert_time(magnitude as f64, unit, default_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_canonical_unit_boundaries() {
        assert_eq!(bytes_to_canonical(KB).unwrap(), "1kB");
        assert_eq!(bytes_to_canonical(MB).unwrap(), "1MB");
        assert_eq!(bytes_to_canonical(GB).unwrap(), "1GB");
        assert_eq!(bytes_to_canonical(TB).unwrap(), "1TB");
    }

    #[test]
    fn test_bytes_to_canonical_below_boundary_uses_lower_unit() {
        assert_eq!(bytes_to_canonical(GB - MB).unwrap(), "1023MB");
        assert_eq!(bytes_to_canonical(TB - GB).unwrap(), "1023GB");
        assert_eq!(bytes_to_canonical(MB - KB).unwrap(), "1023kB");
    }

    #[test]
    fn test_bytes_to_canonical_sub_kilobyte_promoted() {
        assert_eq!(bytes_to_canonical(1).unwrap(), "1kB");
        assert_eq!(bytes_to_canonical(1023).unwrap(), "1kB");
    }

    #[test]
    fn test_bytes_to_canonical_zero_fails() {
        assert!(bytes_to_canonical(0).is_err());
    }

    #[test]
    fn test_bytes_to_canonical_fraction_expands_to_smaller_unit() {
        assert_eq!(bytes_to_canonical(1536 * MB).unwrap(), "1536MB");
        assert_eq!(bytes_to_canonical(3 * GB / 2 + 512 * KB).unwrap(), "1573376kB");
        // 26214.4kB rounds to the nearest kilobyte
        assert_eq!(bytes_to_canonical(26_843_545).unwrap(), "26214kB");
    }

    #[test]
    fn test_bytes_to_canonical_tiny_fraction_dropped() {
        // 1GB + 1kB is well under 0.001GB of remainder
        assert_eq!(bytes_to_canonical(GB + KB).unwrap(), "1GB");
    }

    #[test]
    fn test_canonical_round_trip_on_kilobyte_multiples() {
        for n in [1u64, 7, 1023, 1024, 1536, 26214, 1_048_575, 1_048_576, 3 << 30] {
            let bytes = n * KB;
            let canonical = bytes_to_canonical(bytes).unwrap();
            assert_eq!(canonical_to_bytes(&canonical).unwrap(), bytes, "{canonical}");
        }
    }

    #[test]
    fn test_canonical_to_bytes_valid() {
        assert_eq!(canonical_to_bytes("64kB").unwrap(), 64 * KB);
        assert_eq!(canonical_to_bytes("128MB").unwrap(), 128 * MB);
        assert_eq!(canonical_to_bytes("2GB").unwrap(), 2 * GB);
        assert_eq!(canonical_to_bytes("1TB").unwrap(), TB);
    }

    #[test]
    fn test_canonical_to_bytes_rejects_bad_input() {
        assert!(canonical_to_bytes(" 2GB").is_err());
        assert!(canonical_to_bytes("2GB ").is_err());
        assert!(canonical_to_bytes("2 GB").is_err());
        assert!(canonical_to_bytes("-2GB").is_err());
        assert!(canonical_to_bytes("1.5GB").is_err());
        assert!(canonical_to_bytes("1024B").is_err());
        assert!(canonical_to_bytes("1024").is_err());
        assert!(canonical_to_bytes("2gb").is_err());
        assert!(canonical_to_bytes("GB").is_err());
        assert!(canonical_to_bytes("").is_err());
    }

    #[test]
    fn test_canonical_to_bytes_overflow() {
        assert!(canonical_to_bytes("99999999999999999999kB").is_err());
        assert!(canonical_to_bytes("20000000TB").is_err());
    }

    #[test]
    fn test_bytes_to_decimal() {
        assert_eq!(bytes_to_decimal(8 * GB), "8.00 GB");
        assert_eq!(bytes_to_decimal(1536 * MB), "1.50 GB");
        assert_eq!(bytes_to_decimal(512), "512.00 B");
        assert_eq!(bytes_to_decimal(2 * TB), "2.00 TB");
    }

    #[test]
    fn test_time_ratio_composition() {
        assert_eq!(time_ratio(TimeUnit::Minutes, TimeUnit::Milliseconds), 60000.0);
        assert_eq!(time_ratio(TimeUnit::Days, TimeUnit::Seconds), 86400.0);
        assert_eq!(time_ratio(TimeUnit::Seconds, TimeUnit::Seconds), 1.0);
        assert_eq!(time_ratio(TimeUnit::Milliseconds, TimeUnit::Seconds), 0.001);
    }

    #[test]
    fn test_time_to_canonical() {
        assert_eq!(time_to_canonical(900, TimeUnit::Seconds).unwrap(), "15min");
        assert_eq!(time_to_canonical(90, TimeUnit::Seconds).unwrap(), "90s");
        assert_eq!(time_to_canonical(10, TimeUnit::Milliseconds).unwrap(), "10ms");
        assert_eq!(time_to_canonical(1440, TimeUnit::Minutes).unwrap(), "1d");
        assert!(time_to_canonical(0, TimeUnit::Seconds).is_err());
    }

    #[test]
    fn test_canonical_to_time() {
        assert_eq!(canonical_to_time("15min").unwrap(), (15, TimeUnit::Minutes));
        assert_eq!(canonical_to_time("200ms").unwrap(), (200, TimeUnit::Milliseconds));
        assert!(canonical_to_time("15").is_err());
        assert!(canonical_to_time("1.5s").is_err());
        assert!(canonical_to_time("5 min").is_err());
        assert!(canonical_to_time("5weeks").is_err());
    }

    #[test]
    fn test_parse_duration_with_default_unit() {
        assert_eq!(parse_duration("10", TimeUnit::Seconds).unwrap(), 10.0);
        assert_eq!(parse_duration("1min", TimeUnit::Seconds).unwrap(), 60.0);
        assert_eq!(parse_duration("5min", TimeUnit::Milliseconds).unwrap(), 300_000.0);
        assert!(parse_duration("abc", TimeUnit::Seconds).is_err());
    }
}
