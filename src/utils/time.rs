//! Time parsing and formatting utilities

use crate::error::{SizefitError, SizefitResult};

/// Parser for trim points given as seconds, `MM:SS(.ms)` or `HH:MM:SS(.ms)`
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeParser;

impl TimeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse time string to seconds
    pub fn parse_time(&self, time_str: &str) -> SizefitResult<f64> {
        let time_str = time_str.trim();
        let invalid = || {
            SizefitError::InvalidRequest(format!("Invalid time format: '{}'", time_str))
        };

        let parts: Vec<&str> = time_str.split(':').collect();
        let seconds = match parts.as_slice() {
            [seconds] => Self::component(seconds, None),
            [minutes, seconds] => {
                Some(Self::whole(minutes)? * 60.0 + Self::component(seconds, Some(60.0))?)
            }
            [hours, minutes, seconds] => Some(
                Self::whole(hours)? * 3600.0
                    + Self::bounded_whole(minutes, 60.0)? * 60.0
                    + Self::component(seconds, Some(60.0))?,
            ),
            _ => None,
        }
        .ok_or_else(invalid)?;

        Ok(seconds)
    }

    /// Format seconds to HH:MM:SS.ms (hours omitted when zero)
    pub fn format_time(&self, seconds: f64) -> String {
        let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        let milliseconds = total_ms % 1000;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, milliseconds)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, secs, milliseconds)
        }
    }

    // Fractional seconds, finite and non-negative, below `limit` when given
    fn component(text: &str, limit: Option<f64>) -> Option<f64> {
        let value: f64 = text.trim().parse().ok()?;
        let in_range = value.is_finite() && value >= 0.0 && limit.map_or(true, |l| value < l);
        in_range.then_some(value)
    }

    fn whole(text: &str) -> Option<f64> {
        text.trim().parse::<u64>().ok().map(|v| v as f64)
    }

    fn bounded_whole(text: &str, limit: f64) -> Option<f64> {
        Self::whole(text).filter(|v| *v < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let parser = TimeParser::new();
        assert_eq!(parser.parse_time("7").unwrap(), 7.0);
        assert_eq!(parser.parse_time(" 2.5 ").unwrap(), 2.5);
        assert_eq!(parser.parse_time("01:30").unwrap(), 90.0);
        assert_eq!(parser.parse_time("01:30.250").unwrap(), 90.25);
        assert_eq!(parser.parse_time("1:02:03").unwrap(), 3723.0);
        assert_eq!(parser.parse_time("00:00:05.5").unwrap(), 5.5);
    }

    #[test]
    fn test_rejects_garbage() {
        let parser = TimeParser::new();
        for bad in ["", "abc", "-3", "1:2:3:4", "00:75", "01:61:00", "1.5:00", "inf"] {
            assert!(
                matches!(parser.parse_time(bad), Err(SizefitError::InvalidRequest(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_format_time() {
        let parser = TimeParser::new();
        assert_eq!(parser.format_time(90.25), "01:30.250");
        assert_eq!(parser.format_time(3723.0), "01:02:03.000");
        assert_eq!(parser.format_time(0.0), "00:00.000");
    }
}
