//! Timecode parsing and formatting.
//!
//! Trim bounds arrive either as bare seconds (`"90"`, `"90.5"`) or as
//! `HH:MM:SS` / `MM:SS` timecodes with an optional fractional part.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Invalid timecode: {0}")]
pub struct TimecodeError(pub String);

/// Parse a timecode string into seconds.
pub fn parse_timecode(ts: &str) -> Result<f64, TimecodeError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimecodeError(ts.to_string()));
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let secs = match parts.as_slice() {
        [s] => parse_component(s, ts, f64::MAX)?,
        [m, s] => {
            let minutes = parse_component(m, ts, f64::MAX)?;
            let seconds = parse_component(s, ts, 60.0)?;
            minutes * 60.0 + seconds
        }
        [h, m, s] => {
            let hours = parse_component(h, ts, f64::MAX)?;
            let minutes = parse_component(m, ts, 60.0)?;
            let seconds = parse_component(s, ts, 60.0)?;
            hours * 3600.0 + minutes * 60.0 + seconds
        }
        _ => return Err(TimecodeError(ts.to_string())),
    };

    if secs.is_finite() {
        Ok(secs)
    } else {
        Err(TimecodeError(ts.to_string()))
    }
}

fn parse_component(part: &str, whole: &str, bound: f64) -> Result<f64, TimecodeError> {
    let value: f64 = part
        .parse()
        .map_err(|_| TimecodeError(whole.to_string()))?;
    if value < 0.0 || value >= bound {
        return Err(TimecodeError(whole.to_string()));
    }
    Ok(value)
}

/// Format seconds as `HH:MM:SS.mmm`.
pub fn format_secs(secs: f64) -> String {
    let secs = secs.max(0.0);
    let hours = (secs / 3600.0) as u64;
    let minutes = ((secs % 3600.0) / 60.0) as u64;
    let rem = secs % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, rem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timecode() {
        assert!((parse_timecode("00:00:00").unwrap()).abs() < 0.001);
        assert!((parse_timecode("00:01:00").unwrap() - 60.0).abs() < 0.001);
        assert!((parse_timecode("01:00:00").unwrap() - 3600.0).abs() < 0.001);
        assert!((parse_timecode("00:00:30.500").unwrap() - 30.5).abs() < 0.001);
        assert!((parse_timecode("01:30").unwrap() - 90.0).abs() < 0.001);
        assert!((parse_timecode("90").unwrap() - 90.0).abs() < 0.001);
        assert!((parse_timecode("90.25").unwrap() - 90.25).abs() < 0.001);
    }

    #[test]
    fn test_parse_timecode_rejects_malformed() {
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("abc").is_err());
        assert!(parse_timecode("00:90:00").is_err());
        assert!(parse_timecode("00:00:75").is_err());
        assert!(parse_timecode("-5").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(0.0), "00:00:00.000");
        assert_eq!(format_secs(90.5), "00:01:30.500");
        assert_eq!(format_secs(3661.0), "01:01:01.000");
    }
}
