use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineError {
    #[error("line has no timestamp separator: '{0}'")]
    MissingSeparator(String),

    #[error("failed to parse timestamp '{value}' in line '{line}': {source}")]
    InvalidTimestamp {
        value: String,
        line: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One log line with its leading RFC3339 timestamp parsed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedLine {
    /// Authoritative ordering key
    pub timestamp: DateTime<Utc>,
    /// Original line, trailing whitespace trimmed
    pub raw: String,
    /// Line with the timestamp prefix stripped
    pub content: String,
}

/// Lines are shared between slices while generations are reconciled.
pub type Line = Arc<ProcessedLine>;

impl ProcessedLine {
    /// Parse a raw line of the form `<RFC3339> <content>`.
    ///
    /// The timestamp is the first token up to the first whitespace run; the
    /// content is everything after that run. Nanosecond precision and any UTC
    /// offset are accepted, the timestamp is normalised to UTC.
    pub fn parse(raw_line: &str) -> Result<Self, LineError> {
        let raw = raw_line.trim_end();

        let split_at = raw
            .find(char::is_whitespace)
            .ok_or_else(|| LineError::MissingSeparator(raw.to_string()))?;
        let (timestamp_part, rest) = raw.split_at(split_at);

        let timestamp = DateTime::parse_from_rfc3339(timestamp_part)
            .map_err(|source| LineError::InvalidTimestamp {
                value: timestamp_part.to_string(),
                line: raw.to_string(),
                source,
            })?
            .with_timezone(&Utc);

        Ok(Self {
            timestamp,
            raw: raw.to_string(),
            content: rest.trim_start().to_string(),
        })
    }

    /// Render the line for output, keeping the timestamp prefix or not.
    pub fn render(&self, with_timestamp: bool) -> &str {
        if with_timestamp {
            &self.raw
        } else {
            &self.content
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_basic_line() {
        let line = ProcessedLine::parse("2025-12-04T10:00:00Z ptp4l[1234]: master offset 5").unwrap();
        assert_eq!(
            line.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 4, 10, 0, 0).unwrap()
        );
        assert_eq!(line.content, "ptp4l[1234]: master offset 5");
        assert_eq!(line.raw, "2025-12-04T10:00:00Z ptp4l[1234]: master offset 5");
    }

    #[test]
    fn test_parse_nanosecond_precision() {
        let line = ProcessedLine::parse("2025-12-04T10:00:00.123456789Z phc2sys offset").unwrap();
        assert_eq!(line.timestamp.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_parse_offset_normalised_to_utc() {
        let line = ProcessedLine::parse("2025-12-04T12:00:00+02:00 hello").unwrap();
        assert_eq!(
            line.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 4, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_trims_trailing_whitespace() {
        let line = ProcessedLine::parse("2025-12-04T10:00:00Z content  \r\n").unwrap();
        assert_eq!(line.raw, "2025-12-04T10:00:00Z content");
        assert_eq!(line.content, "content");
    }

    #[test]
    fn test_parse_collapses_separator_run() {
        let line = ProcessedLine::parse("2025-12-04T10:00:00Z \t  spaced out").unwrap();
        assert_eq!(line.content, "spaced out");
        assert_eq!(line.raw, "2025-12-04T10:00:00Z \t  spaced out");
    }

    #[test]
    fn test_parse_missing_separator() {
        let result = ProcessedLine::parse("2025-12-04T10:00:00Z");
        assert!(matches!(result, Err(LineError::MissingSeparator(_))));
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        let result = ProcessedLine::parse("yesterday something happened");
        match result {
            Err(LineError::InvalidTimestamp { value, .. }) => assert_eq!(value, "yesterday"),
            other => panic!("expected invalid timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_round_trip() {
        let originals = [
            "2025-12-04T10:00:00Z a",
            "2025-12-04T10:00:00.5Z multiple words here",
            "2025-12-04T10:00:00.000000001+05:30 x=1 y=2   ",
        ];
        for original in originals {
            let line = ProcessedLine::parse(original).unwrap();
            assert_eq!(line.raw, original.trim_end());
            let rebuilt = format!(
                "{} {}",
                &original[..original.find(' ').unwrap()],
                line.content
            );
            assert_eq!(rebuilt, original.trim_end());
        }
    }

    #[test]
    fn test_render() {
        let line = ProcessedLine::parse("2025-12-04T10:00:00Z payload").unwrap();
        assert_eq!(line.render(true), "2025-12-04T10:00:00Z payload");
        assert_eq!(line.render(false), "payload");
    }
}
