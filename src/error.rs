//! Error and warning types.
//!
//! Fatal problems surface as [`FcsError`]; the codec never recovers
//! internally. Recoverable findings (duplicate keywords, offset mismatches
//! that the standard tells us how to resolve, repaired values) are collected
//! as [`Warning`]s and attached to whatever the reader or writer returns.

use crate::keywords::Mode;
use crate::segment::SegmentId;
use crate::text::KeyString;

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Any error produced while reading or writing an FCS file.
#[derive(Debug, Error)]
pub enum FcsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed HEADER: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("malformed TEXT: {0}")]
    MalformedText(#[from] TextError),

    #[error("required keyword {0} is missing")]
    MissingRequiredKeyword(KeyString),

    #[error("value '{value}' for keyword {key} is invalid: {msg}")]
    InvalidKeyword {
        key: KeyString,
        value: String,
        msg: String,
    },

    #[error("$DATATYPE must be one of I, F, D, or A; found '{0}'")]
    UnsupportedDataType(String),

    #[error("$MODE={0} is not supported; only list mode (L) data can be read")]
    UnsupportedMode(Mode),

    #[error(transparent)]
    UnsupportedBitWidth(#[from] BitWidthError),

    #[error("unsupported $BYTEORD: {0}")]
    UnsupportedByteOrder(String),

    #[error(
        "{id} segment size disagrees with TEXT keywords: \
         expected {expected}, found {actual}"
    )]
    InconsistentOffsets {
        id: SegmentId,
        expected: u64,
        actual: u64,
    },

    #[error("file ends before declared {id} segment: need {needed} bytes, file has {available}")]
    TruncatedData {
        id: SegmentId,
        needed: u64,
        available: u64,
    },

    #[error("event buffer length {len} is not divisible by channel count {par}")]
    InvalidEventShape { len: usize, par: usize },

    #[error("event buffer does not hold {0} values; pick a matching $DATATYPE")]
    EventTypeMismatch(crate::keywords::AlphaNumType),

    #[error("$NEXTDATA at offset {current} points backwards or at itself (next would be {next})")]
    InvalidNextData { current: u64, next: u64 },
}

/// Errors from decoding the fixed 58-byte HEADER.
#[derive(Debug)]
pub enum HeaderError {
    Truncated,
    NotAscii,
    Version(String),
    Offset {
        region: &'static str,
        is_begin: bool,
        source: String,
    },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            HeaderError::Truncated => {
                write!(f, "fewer than 58 bytes available")
            }
            HeaderError::NotAscii => write!(f, "HEADER must be ASCII"),
            HeaderError::Version(v) => {
                write!(f, "unrecognized magic/version string '{v}'")
            }
            HeaderError::Offset {
                region,
                is_begin,
                source,
            } => {
                let which = if *is_begin { "begin" } else { "end" };
                write!(
                    f,
                    "non-numeric {which} offset for {region} segment: '{source}'"
                )
            }
        }
    }
}

impl std::error::Error for HeaderError {}

/// Errors from tokenizing a TEXT (or ANALYSIS) segment.
#[derive(Debug)]
pub enum TextError {
    Empty,
    NulDelimiter,
    UnevenWordCount(usize),
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TextError::Empty => write!(f, "segment holds no bytes"),
            TextError::NulDelimiter => write!(f, "delimiter byte must not be NUL"),
            TextError::UnevenWordCount(n) => {
                write!(f, "found {n} words, which do not pair into keywords")
            }
        }
    }
}

impl std::error::Error for TextError {}

/// Errors from `$PnB` values the decoder cannot honor.
#[derive(Debug)]
pub enum BitWidthError {
    TooWide { index: usize, bits: u32 },
    NotByteAligned { index: usize, bits: u32 },
    NotFloatWidth { index: usize, expected: u32 },
    MixedVariable { index: usize },
    VariableOutsideAscii { index: usize },
    MixedOrderMismatch { index: usize, bytes: u32, order: usize },
    PackedNeedsEndian,
    Zero { index: usize },
}

impl fmt::Display for BitWidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            BitWidthError::TooWide { index, bits } => {
                write!(f, "$P{index}B is {bits} bits; widths above 64 are unsupported")
            }
            BitWidthError::NotByteAligned { index, bits } => write!(
                f,
                "$P{index}B is {bits} bits, which is not a multiple of 8 \
                 (enable tight bit packing to read such files)"
            ),
            BitWidthError::NotFloatWidth { index, expected } => {
                write!(f, "$P{index}B must be {expected} for this $DATATYPE")
            }
            BitWidthError::MixedVariable { index } => write!(
                f,
                "$P{index}B mixes '*' with fixed widths; ASCII data must be \
                 uniformly delimited or uniformly fixed"
            ),
            BitWidthError::VariableOutsideAscii { index } => {
                write!(f, "$P{index}B is '*', which is only valid for $DATATYPE=A")
            }
            BitWidthError::MixedOrderMismatch {
                index,
                bytes,
                order,
            } => write!(
                f,
                "$P{index}B spans {bytes} bytes but $BYTEORD permutes {order}"
            ),
            BitWidthError::PackedNeedsEndian => write!(
                f,
                "bit-packed data requires a little- or big-endian $BYTEORD"
            ),
            BitWidthError::Zero { index } => write!(f, "$P{index}B must be positive"),
        }
    }
}

impl std::error::Error for BitWidthError {}

/// A non-fatal finding attached to the output of a read or write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Warning {
    /// TEXT declared the same keyword twice; the later value was kept.
    DuplicateKey(KeyString),
    /// Supplemental TEXT repeated a primary keyword; the primary value was
    /// kept.
    SupplementalDuplicateKey(KeyString),
    /// A keyword with non-ASCII characters in its key was kept as-is.
    NonAsciiKey(String),
    /// The TEXT segment did not end with a delimiter.
    MissingFinalDelimiter,
    /// HEADER and TEXT disagreed on a segment's offsets; TEXT won.
    OffsetMismatch {
        id: SegmentId,
        header: (u64, u64),
        text: (u64, u64),
    },
    /// The DATA segment carried one byte more than the layout needs; the
    /// writer most likely stored an exclusive end offset.
    DataEndSlack,
    /// `$PnE` declared a log scale with a zero offset; 1.0 was substituted
    /// per the standard.
    LogScaleOffsetRepaired { index: usize },
    /// An optional keyword failed to parse and was ignored.
    BadOptionalValue { key: KeyString, value: String },
    /// A reserved keyword in the writer's extra TEXT input was dropped; the
    /// writer computes these itself.
    ReservedKeywordDropped(KeyString),
    /// An event value exceeded its channel's `$PnR` bitmask and was clamped
    /// while writing.
    ValueClamped { index: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Warning::DuplicateKey(k) => write!(f, "duplicate keyword {k}; last value wins"),
            Warning::SupplementalDuplicateKey(k) => {
                write!(f, "supplemental TEXT repeats {k}; primary value kept")
            }
            Warning::NonAsciiKey(k) => write!(f, "keyword '{k}' is not ASCII"),
            Warning::MissingFinalDelimiter => {
                write!(f, "TEXT segment does not end with a delimiter")
            }
            Warning::OffsetMismatch { id, header, text } => write!(
                f,
                "{id} offsets disagree: {},{} (HEADER) vs {},{} (TEXT); using TEXT",
                header.0, header.1, text.0, text.1
            ),
            Warning::DataEndSlack => write!(
                f,
                "DATA end offset appears to be exclusive; final byte ignored"
            ),
            Warning::LogScaleOffsetRepaired { index } => {
                write!(f, "$P{index}E log offset of 0 replaced with 1.0")
            }
            Warning::BadOptionalValue { key, value } => {
                write!(f, "ignoring unparseable value '{value}' for {key}")
            }
            Warning::ReservedKeywordDropped(k) => {
                write!(f, "dropping reserved keyword {k} from extra TEXT")
            }
            Warning::ValueClamped { index } => {
                write!(f, "events for channel {index} exceed $P{index}R; clamped")
            }
        }
    }
}
