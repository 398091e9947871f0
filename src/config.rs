use std::fmt;

/// Instructions for reading an FCS file.
///
/// The defaults parse standard-conforming files; every flag exists to cope
/// with a specific class of non-conforming (but common) output from real
/// acquisition software.
#[derive(Debug, Default, Clone)]
pub struct ReadConfig {
    /// Treat every delimiter in TEXT as a literal word boundary instead of
    /// collapsing doubled delimiters into an escaped delimiter byte.
    ///
    /// The standard's escape rule makes blank values unrepresentable, yet
    /// many files contain them. Enable this for files whose values never
    /// embed the delimiter but may be empty.
    pub literal_delimiters: bool,

    /// Use the HEADER offsets for the DATA segment even when TEXT provides
    /// `$BEGINDATA`/`$ENDDATA`. Also suppresses the mismatch warning.
    pub use_header_offsets: bool,

    /// Tolerate a DATA segment that is exactly one byte longer than
    /// `$PAR x $TOT x width`. Some writers store the end offset exclusive
    /// instead of inclusive; with this set the extra byte is ignored and a
    /// warning is attached.
    pub allow_data_slack: bool,

    /// Decode integer data whose `$PnB` widths are not multiples of 8 as a
    /// tightly packed big-endian bit stream.
    ///
    /// The standard under-specifies such files and writers disagree, so the
    /// default is to reject them instead of guessing.
    pub tight_bit_packing: bool,
}

/// The single-byte delimiter used when writing TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextDelim(u8);

impl Default for TextDelim {
    fn default() -> TextDelim {
        TextDelim(b'|')
    }
}

impl TextDelim {
    /// The delimiter may be any ASCII byte in `[1, 126]`.
    pub fn new(x: u8) -> Result<TextDelim, TextDelimError> {
        if (1..=126).contains(&x) {
            Ok(TextDelim(x))
        } else {
            Err(TextDelimError(x))
        }
    }

    pub fn inner(&self) -> u8 {
        self.0
    }
}

#[derive(Debug)]
pub struct TextDelimError(u8);

impl fmt::Display for TextDelimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "delimiter should be a byte b/t 1 and 126, got {}", self.0)
    }
}

impl std::error::Error for TextDelimError {}

/// Instructions for writing an FCS file.
#[derive(Debug, Default, Clone)]
pub struct WriteConfig {
    /// Delimiter for the TEXT segment (default `|`).
    pub delim: TextDelim,
}
