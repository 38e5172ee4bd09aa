//! Human-readable byte sizes ("512MB", "2GB").

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

// Longest suffixes first so "MB" is not read as "B".
const UNITS: [(&str, u64); 9] = [
    ("TB", TB),
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("T", TB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// A size string that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{0}', expected a value like '512MB', '2GB' or '1048576'")]
pub struct SizeParseError(String);

/// Parse a byte count with an optional binary unit suffix.
///
/// Units are case-insensitive and may be separated from the number by
/// whitespace. A bare number is a byte count.
///
/// ```
/// use terrastream::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("512 mb").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|rest| (rest.trim_end(), *multiplier))
        })
        .unwrap_or((upper.as_str(), 1));

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SizeParseError(input.to_string()));
    }
    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| SizeParseError(input.to_string()))
}

/// Format a byte count using the largest unit that divides it exactly.
///
/// ```
/// use terrastream::config::format_size;
///
/// assert_eq!(format_size(384 * 1024 * 1024), "384MB");
/// assert_eq!(format_size(1536), "1536");
/// ```
pub fn format_size(bytes: u64) -> String {
    for (suffix, unit) in [("TB", TB), ("GB", GB), ("MB", MB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    if bytes >= KB && bytes % KB == 0 {
        return format!("{}KB", bytes / KB);
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("8k").unwrap(), 8 * KB);
        assert_eq!(parse_size("8KB").unwrap(), 8 * KB);
        assert_eq!(parse_size(" 384 MB ").unwrap(), 384 * MB);
        assert_eq!(parse_size("2gb").unwrap(), 2 * GB);
        assert_eq!(parse_size("1T").unwrap(), TB);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "MB", "-1GB", "1.5GB", "12XB", "GB12", "1 2MB"] {
            assert!(parse_size(input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size("99999999999999TB").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(64 * KB), "64KB");
        assert_eq!(format_size(512 * MB), "512MB");
        assert_eq!(format_size(2 * GB), "2GB");
        assert_eq!(format_size(3 * TB), "3TB");
        assert_eq!(format_size(1536), "1536");
    }

    #[test]
    fn test_format_parses_back() {
        for bytes in [1, 1024, 3 * MB, 5 * GB + MB, 7 * TB] {
            assert_eq!(parse_size(&format_size(bytes)).unwrap(), bytes);
        }
    }
}
