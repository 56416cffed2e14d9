//! Acquisition-time handling for granule identifiers.

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::SwathError;

/// Compact `YYYYMMDDTHHMMSS` format used in granule identifiers and
/// exported file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

const TOKEN_LEN: usize = 15;

/// Parse the acquisition time from a granule identifier.
///
/// The identifier is split on every non-alphanumeric character; the first
/// token of exactly 15 characters shaped like `YYYYMMDDTHHMMSS` that is also a
/// valid calendar time wins. For example
/// `EN1_MDSI_MER_RR__2P_20100401T185204_20100401T185934_042173` yields
/// `2010-04-01T18:52:04Z` (the sensing start, not the stop).
pub fn parse_acquisition_time(identifier: &str) -> Result<DateTime<Utc>, SwathError> {
    identifier
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| is_timestamp_shaped(token))
        .find_map(|token| NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| SwathError::TimestampParse(identifier.to_string()))
}

/// Format a time back into the compact identifier token.
pub fn timestamp_token(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Truncate a time to midnight UTC of the same day.
pub fn day_floor(dt: &DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&dt.date_naive().and_time(NaiveTime::MIN))
}

fn is_timestamp_shaped(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == TOKEN_LEN
        && bytes[8] == b'T'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meris_identifier() {
        let id = "EN1_MDSI_MER_RR__2P_20100401T185204_20100401T185934_042173_0058_20180710T023325_0100";
        let dt = parse_acquisition_time(id).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2010, 4, 1, 18, 52, 4).unwrap());
    }

    #[test]
    fn test_parse_with_other_delimiters() {
        let dt = parse_acquisition_time("granule-20100402T050000.SEN3").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2010, 4, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_skips_invalid_calendar_tokens() {
        // Month 13 is shaped correctly but not a date; the next token wins.
        let dt = parse_acquisition_time("X_20101301T000000_20100403T120000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2010, 4, 3, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_no_token() {
        for id in ["", "no_time_here", "EN1_2010040T185204", "EN1_20100401T1852045"] {
            assert!(matches!(
                parse_acquisition_time(id),
                Err(SwathError::TimestampParse(_))
            ));
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2010, 4, 1, 19, 0, 59).unwrap();
        assert_eq!(timestamp_token(&dt), "20100401T190059");
        assert_eq!(parse_acquisition_time(&timestamp_token(&dt)).unwrap(), dt);
    }

    #[test]
    fn test_day_floor() {
        let dt = Utc.with_ymd_and_hms(2010, 4, 1, 18, 52, 4).unwrap();
        assert_eq!(day_floor(&dt), Utc.with_ymd_and_hms(2010, 4, 1, 0, 0, 0).unwrap());
    }
}
