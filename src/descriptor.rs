//! Companion log parsing.
//!
//! The motif generator writes one record per clip:
//! `name segmentId startTime stopTime startFrame endFrame`, whitespace separated,
//! optionally followed by an annotation after [`ANNOTATION_DELIMITER`]. Logs are
//! normally UTF-16 with a byte order mark; UTF-8 is accepted too.

use std::fs;
use std::path::Path;

use crate::error::{ClipError, Result};

/// Name reserved for synchronization records
pub const MARKER_NAME: &str = "marker";

/// Separates the six governing fields from a free-form annotation
pub const ANNOTATION_DELIMITER: &str = "\u{a0}a";

/// One record of the companion log
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDescriptor {
    pub name: String,
    pub segment: u32,
    /// Seconds, log clock
    pub start_time: f64,
    pub stop_time: f64,
    /// Frames, log numbering
    pub start_frame: i64,
    pub end_frame: i64,
}

impl ClipDescriptor {
    pub fn is_marker(&self) -> bool {
        self.name == MARKER_NAME
    }

    /// Parse one line. Returns `Ok(None)` for blank lines.
    pub fn parse_line(line: &str, line_number: usize) -> Result<Option<Self>> {
        let record = line.split(ANNOTATION_DELIMITER).next().unwrap_or("").trim();
        if record.is_empty() {
            return Ok(None);
        }

        let fields: Vec<&str> = record.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ClipError::Log {
                line: line_number,
                reason: format!("expected 6 fields, found {}", fields.len()),
            });
        }

        let bad = |what: &str, value: &str| ClipError::Log {
            line: line_number,
            reason: format!("invalid {} '{}'", what, value),
        };

        Ok(Some(ClipDescriptor {
            name: fields[0].to_string(),
            segment: fields[1].parse().map_err(|_| bad("segment id", fields[1]))?,
            start_time: fields[2].parse().map_err(|_| bad("start time", fields[2]))?,
            stop_time: fields[3].parse().map_err(|_| bad("stop time", fields[3]))?,
            start_frame: fields[4].parse().map_err(|_| bad("start frame", fields[4]))?,
            end_frame: fields[5].parse().map_err(|_| bad("end frame", fields[5]))?,
        }))
    }
}

/// Parse a whole log, in order.
pub fn parse_log(text: &str) -> Result<Vec<ClipDescriptor>> {
    let mut descriptors = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(descriptor) = ClipDescriptor::parse_line(line, i + 1)? {
            descriptors.push(descriptor);
        }
    }
    Ok(descriptors)
}

/// Decode log bytes: UTF-16 when a byte order mark is present, UTF-8 otherwise.
pub fn decode_log(bytes: &[u8]) -> Result<String> {
    let invalid = |reason: &str| ClipError::Log {
        line: 0,
        reason: reason.to_string(),
    };

    let utf16 = |body: &[u8], from: fn([u8; 2]) -> u16| -> Result<String> {
        if body.len() % 2 != 0 {
            return Err(invalid("odd byte count in UTF-16 log"));
        }
        let units: Vec<u16> = body.chunks_exact(2).map(|c| from([c[0], c[1]])).collect();
        String::from_utf16(&units).map_err(|_| invalid("invalid UTF-16"))
    };

    match bytes {
        [0xFF, 0xFE, body @ ..] => utf16(body, u16::from_le_bytes),
        [0xFE, 0xFF, body @ ..] => utf16(body, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, body @ ..] => {
            String::from_utf8(body.to_vec()).map_err(|_| invalid("invalid UTF-8"))
        }
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| invalid("invalid UTF-8")),
    }
}

/// Read and parse a log file.
pub fn read_log(path: &Path) -> Result<Vec<ClipDescriptor>> {
    let bytes = fs::read(path)?;
    parse_log(&decode_log(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut out = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_parse_clip_line() {
        let d = ClipDescriptor::parse_line("note1 0 1.0 1.5 45100 66150", 1)
            .unwrap()
            .unwrap();
        assert_eq!(d.name, "note1");
        assert_eq!(d.segment, 0);
        assert_eq!(d.start_time, 1.0);
        assert_eq!(d.stop_time, 1.5);
        assert_eq!(d.start_frame, 45100);
        assert_eq!(d.end_frame, 66150);
        assert!(!d.is_marker());
    }

    #[test]
    fn test_parse_marker_line() {
        let d = ClipDescriptor::parse_line("marker\t0\t2.5  2.6 110250 114660", 1)
            .unwrap()
            .unwrap();
        assert!(d.is_marker());
        assert_eq!(d.start_time, 2.5);
    }

    #[test]
    fn test_annotation_discarded() {
        let line = "maj_c4_up 0 3.0 4.0 132300 176400\u{a0}a C E G, quarter notes";
        let d = ClipDescriptor::parse_line(line, 7).unwrap().unwrap();
        assert_eq!(d.name, "maj_c4_up");
        assert_eq!(d.end_frame, 176400);
    }

    #[test]
    fn test_blank_lines_skipped() {
        assert!(ClipDescriptor::parse_line("   ", 1).unwrap().is_none());
        let parsed = parse_log("\nnote1 0 1 2 3 4\r\n\nnote2 0 2 3 4 5\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "note2");
    }

    #[test]
    fn test_wrong_field_count() {
        match parse_log("note1 0 1 2 3 4\nnote2 0 1 2 3\n") {
            Err(ClipError::Log { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("found 5"));
            }
            other => panic!("expected log error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_number() {
        assert!(matches!(
            ClipDescriptor::parse_line("note1 zero 1 2 3 4", 3),
            Err(ClipError::Log { line: 3, .. })
        ));
        assert!(ClipDescriptor::parse_line("note1 0 1 2 3.5 4", 3).is_err());
    }

    #[test]
    fn test_decode_utf16_log() {
        let text = "marker 0 0.5 0.6 22050 26460\nnote1 0 1.0 1.5 45100 66150\n";
        let decoded = decode_log(&utf16le_with_bom(text)).unwrap();
        assert_eq!(decoded, text);
        let parsed = parse_log(&decoded).unwrap();
        assert!(parsed[0].is_marker());
        assert_eq!(parsed[1].start_frame, 45100);
    }

    #[test]
    fn test_decode_utf16_be_and_utf8() {
        let mut be = vec![0xFE, 0xFF];
        for unit in "ab".encode_utf16() {
            be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_log(&be).unwrap(), "ab");
        assert_eq!(decode_log(b"\xEF\xBB\xBFab").unwrap(), "ab");
        assert_eq!(decode_log(b"ab").unwrap(), "ab");
        assert!(decode_log(&[0xFF, 0xFE, 0x61]).is_err());
    }

    #[test]
    fn test_read_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.log");
        fs::write(&path, utf16le_with_bom("note1 0 1.0 1.5 45100 66150\n")).unwrap();
        let parsed = read_log(&path).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].segment, 0);
    }
}
