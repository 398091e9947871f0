use crate::error::{FcsError, HeaderError};
use crate::segment::Segment;

use serde::Serialize;
use std::fmt;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::str;
use std::str::FromStr;

/// The length of the HEADER.
///
/// Fixed by the standard: 6 bytes of magic/version, 4 spaces, and six
/// 8-byte offset fields. OTHER segments would follow but carry no length
/// information of their own and are ignored.
pub const HEADER_LEN: usize = 58;

const VERSION_END: usize = 6;
const SPACE_END: usize = VERSION_END + 4;
const T0_END: usize = SPACE_END + 8;
const T1_END: usize = T0_END + 8;
const D0_END: usize = T1_END + 8;
const D1_END: usize = D0_END + 8;
const A0_END: usize = D1_END + 8;
const A1_END: usize = A0_END + 8;

/// All FCS versions this library supports.
///
/// This appears as the first 6 bytes of any valid FCS file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Serialize)]
pub enum Version {
    FCS2_0,
    FCS3_0,
    FCS3_1,
}

/// Output from parsing the 58-byte HEADER.
///
/// Segment offsets are kept exactly as written (relative to the start of
/// the owning data set); a zero or inverted pair becomes an empty segment,
/// which for DATA/ANALYSIS means "consult TEXT".
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Header {
    pub version: Version,
    pub text: Segment,
    pub data: Segment,
    pub analysis: Segment,
}

/// Read and parse a HEADER starting at absolute position `base`.
pub fn h_read_header<R: Read + Seek>(
    h: &mut BufReader<R>,
    base: u64,
) -> Result<Header, FcsError> {
    let mut buf = [0; HEADER_LEN];
    h.seek(SeekFrom::Start(base))?;
    h.read_exact(&mut buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => FcsError::from(HeaderError::Truncated),
        _ => FcsError::Io(e),
    })?;
    if !buf.is_ascii() {
        return Err(HeaderError::NotAscii.into());
    }
    // ASSUME valid UTF-8 since we just checked for ASCII
    let s = unsafe { str::from_utf8_unchecked(&buf) };
    parse_header(s).map_err(FcsError::MalformedHeader)
}

fn parse_header(s: &str) -> Result<Header, HeaderError> {
    let version = s[0..VERSION_END].parse::<Version>()?;
    let text = parse_segment(&s[SPACE_END..T0_END], &s[T0_END..T1_END], "TEXT", false)?;
    let data = parse_segment(&s[T1_END..D0_END], &s[D0_END..D1_END], "DATA", false)?;
    let analysis = parse_segment(&s[D1_END..A0_END], &s[A0_END..A1_END], "ANALYSIS", true)?;
    Ok(Header {
        version,
        text,
        data,
        analysis,
    })
}

fn parse_segment(
    s0: &str,
    s1: &str,
    region: &'static str,
    allow_blank: bool,
) -> Result<Segment, HeaderError> {
    let begin = parse_offset(s0, region, true, allow_blank)?;
    let end = parse_offset(s1, region, false, allow_blank)?;
    Ok(Segment::new(begin, end))
}

/// Parse one 8-byte offset field: a right-justified, space-padded decimal.
///
/// Some instruments leave the ANALYSIS fields entirely blank rather than
/// writing 0; `allow_blank` accepts that for the optional segments.
fn parse_offset(
    s: &str,
    region: &'static str,
    is_begin: bool,
    allow_blank: bool,
) -> Result<u64, HeaderError> {
    let trimmed = s.trim();
    if trimmed.is_empty() && allow_blank {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| HeaderError::Offset {
        region,
        is_begin,
        source: s.to_string(),
    })
}

impl FromStr for Version {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FCS2.0" => Ok(Version::FCS2_0),
            "FCS3.0" => Ok(Version::FCS3_0),
            "FCS3.1" => Ok(Version::FCS3_1),
            _ => Err(HeaderError::Version(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Version::FCS2_0 => write!(f, "FCS2.0"),
            Version::FCS3_0 => write!(f, "FCS3.0"),
            Version::FCS3_1 => write!(f, "FCS3.1"),
        }
    }
}

/// Format one HEADER offset field: zero-padded to 8 digits.
///
/// Segments whose end offset exceeds the field's 99,999,999 ceiling are
/// written as `0`, with the true offsets left to the TEXT keywords.
pub(crate) fn format_header_offsets(seg: Segment) -> String {
    match seg.bounds() {
        Some((begin, end)) if end <= 99_999_999 => format!("{begin:0>8}{end:0>8}"),
        _ => format!("{:0>8}{:0>8}", 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_header(version: &str, fields: [u64; 6]) -> String {
        let mut s = format!("{version}    ");
        for x in fields {
            s.push_str(&format!("{x:>8}"));
        }
        s
    }

    #[test]
    fn test_parse_31() {
        let s = mk_header("FCS3.1", [58, 1023, 1024, 2047, 0, 0]);
        let h = parse_header(&s).unwrap();
        assert_eq!(h.version, Version::FCS3_1);
        assert_eq!(h.text.bounds(), Some((58, 1023)));
        assert_eq!(h.data.bounds(), Some((1024, 2047)));
        assert!(h.analysis.is_empty());
    }

    #[test]
    fn test_parse_20_blank_analysis() {
        let mut s = mk_header("FCS2.0", [58, 1023, 1024, 2047, 0, 0]);
        s.replace_range(42..58, "                ");
        let h = parse_header(&s).unwrap();
        assert_eq!(h.version, Version::FCS2_0);
        assert!(h.analysis.is_empty());
    }

    #[test]
    fn test_zero_data_offsets() {
        let s = mk_header("FCS3.0", [58, 1023, 0, 0, 0, 0]);
        let h = parse_header(&s).unwrap();
        assert!(h.data.is_empty());
    }

    #[test]
    fn test_bad_version() {
        let s = mk_header("FCS9.9", [58, 1023, 0, 0, 0, 0]);
        assert!(matches!(parse_header(&s), Err(HeaderError::Version(_))));
    }

    #[test]
    fn test_bad_offset() {
        let mut s = mk_header("FCS3.1", [58, 1023, 0, 0, 0, 0]);
        s.replace_range(26..34, "...bad..");
        assert!(matches!(parse_header(&s), Err(HeaderError::Offset { .. })));
    }

    #[test]
    fn test_version_to_from_str() {
        for v in ["FCS2.0", "FCS3.0", "FCS3.1"] {
            assert_eq!(v.parse::<Version>().unwrap().to_string(), v);
        }
    }

    #[test]
    fn test_format_header_offsets() {
        assert_eq!(format_header_offsets(Segment::new(58, 996)), "0000005800000996");
        assert_eq!(
            format_header_offsets(Segment::new(100_000_123, 100_040_122)),
            "0000000000000000"
        );
        assert_eq!(format_header_offsets(Segment::Empty), "0000000000000000");
    }
}
