use serde::Serialize;
use std::fmt;
use std::io;
use std::io::{BufReader, Read, Seek, SeekFrom};

/// A segment in an FCS file which is denoted by a pair of byte offsets.
///
/// Offsets are relative to the start of the data set that declared them,
/// and the end offset points at the last byte of the segment (inclusive).
/// A segment whose offsets are both zero, or whose end precedes its begin,
/// is empty; this is the conventional way for files to mark an absent
/// ANALYSIS or DATA segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Segment {
    NonEmpty {
        begin: u64,
        end: u64,
    },
    #[default]
    Empty,
}

/// The kind of segment in an FCS file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentId {
    PrimaryText,
    SupplementalText,
    Data,
    Analysis,
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let x = match self {
            SegmentId::PrimaryText => "TEXT",
            SegmentId::SupplementalText => "STEXT",
            SegmentId::Data => "DATA",
            SegmentId::Analysis => "ANALYSIS",
        };
        write!(f, "{x}")
    }
}

impl Segment {
    /// Build a segment from a begin/end offset pair.
    ///
    /// Inverted pairs and pairs whose begin is zero collapse to
    /// [`Segment::Empty`]; a zero begin offset is the standard's sentinel for
    /// "not stored here" and can never point at real content since the
    /// HEADER occupies the first 58 bytes.
    pub fn new(begin: u64, end: u64) -> Segment {
        if begin == 0 || begin > end {
            Segment::Empty
        } else {
            Segment::NonEmpty { begin, end }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Segment::Empty)
    }

    /// Number of bytes spanned (end offset is inclusive).
    pub fn nbytes(&self) -> u64 {
        match self {
            Segment::NonEmpty { begin, end } => end - begin + 1,
            Segment::Empty => 0,
        }
    }

    pub fn bounds(&self) -> Option<(u64, u64)> {
        match self {
            Segment::NonEmpty { begin, end } => Some((*begin, *end)),
            Segment::Empty => None,
        }
    }

    /// Read the whole segment into `buf`, resolving offsets against `base`
    /// (the absolute position of the owning data set's HEADER).
    pub(crate) fn h_read<R: Read + Seek>(
        &self,
        h: &mut BufReader<R>,
        base: u64,
        buf: &mut Vec<u8>,
    ) -> io::Result<()> {
        if let Segment::NonEmpty { begin, .. } = self {
            h.seek(SeekFrom::Start(base + begin))?;
            h.take(self.nbytes()).read_to_end(buf)?;
        }
        Ok(())
    }
}
