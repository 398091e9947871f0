//! Raw TEXT segment handling.
//!
//! The TEXT segment (and ANALYSIS, which shares its grammar) is a single
//! delimiter byte followed by alternating key and value words separated by
//! that delimiter. A doubled delimiter inside a word stands for a literal
//! delimiter byte. Keys are case-insensitive; values are kept verbatim.

use crate::config::ReadConfig;
use crate::error::{TextError, Warning};

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use unicase::Ascii;

/// A normalized TEXT keyword.
///
/// Stored case-folded to lowercase with the leading `$` of standard
/// keywords preserved. Hashing and comparison are case-insensitive, so a
/// map keyed by `KeyString` cannot hold two spellings of the same keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyString(Ascii<String>);

impl KeyString {
    pub fn new(s: &str) -> KeyString {
        KeyString(Ascii::new(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for KeyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0.as_str())
    }
}

impl FromStr for KeyString {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(KeyString::new(s))
    }
}

impl AsRef<str> for KeyString {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Serialize for KeyString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Keyword pairs as pulled from a TEXT or ANALYSIS segment.
pub type RawKeywords = HashMap<KeyString, String>;

/// Parse a raw TEXT (or ANALYSIS) byte range into keyword pairs.
///
/// The first byte names the delimiter; the rest is tokenized with the
/// doubled-delimiter escape unless [`ReadConfig::literal_delimiters`] is
/// set. Returns the delimiter alongside the map so callers can report it.
pub(crate) fn parse_raw_text(
    buf: &[u8],
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<(u8, RawKeywords), TextError> {
    let delim = verify_delim(buf)?;
    let words = tokenize(&buf[1..], delim, conf.literal_delimiters, warnings);
    let kws = pair_words(words, warnings)?;
    Ok((delim, kws))
}

/// Check that a segment is non-empty and pull out its delimiter byte.
///
/// The standard restricts delimiters to ASCII 1-126 but real files stray;
/// any non-NUL byte is accepted.
pub(crate) fn verify_delim(buf: &[u8]) -> Result<u8, TextError> {
    match buf.first() {
        None => Err(TextError::Empty),
        Some(0) => Err(TextError::NulDelimiter),
        Some(d) => Ok(*d),
    }
}

/// Split the body of a TEXT segment (everything after the leading
/// delimiter) into words.
///
/// With escaping on, a doubled delimiter contributes one literal delimiter
/// byte to the current word. This makes genuinely blank values ambiguous
/// (the standard shares the blame); `literal` mode is the escape hatch for
/// files that use them.
fn tokenize(xs: &[u8], delim: u8, literal: bool, warnings: &mut Vec<Warning>) -> Vec<Vec<u8>> {
    let mut words = Vec::new();
    let mut word = Vec::new();
    let mut terminated = false;
    let mut i = 0;
    while i < xs.len() {
        if xs[i] != delim {
            word.push(xs[i]);
            terminated = false;
            i += 1;
        } else if !literal && xs.get(i + 1) == Some(&delim) {
            word.push(delim);
            terminated = false;
            i += 2;
        } else {
            words.push(std::mem::take(&mut word));
            terminated = true;
            i += 1;
        }
    }
    if !word.is_empty() {
        // trailing word with no final delimiter; sketchy but recoverable
        warnings.push(Warning::MissingFinalDelimiter);
        words.push(word);
    } else if !terminated && !xs.is_empty() {
        warnings.push(Warning::MissingFinalDelimiter);
    }
    words
}

/// Pair words into keywords, normalizing keys and recording duplicates.
///
/// Later duplicates overwrite earlier ones; each collision is surfaced as a
/// warning so callers can audit what was discarded.
fn pair_words(words: Vec<Vec<u8>>, warnings: &mut Vec<Warning>) -> Result<RawKeywords, TextError> {
    let n = words.len();
    if n % 2 != 0 {
        return Err(TextError::UnevenWordCount(n));
    }
    let mut kws = RawKeywords::with_capacity(n / 2);
    let mut it = words.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        let kstr = decode_word(k);
        if !kstr.is_ascii() {
            warnings.push(Warning::NonAsciiKey(kstr.clone()));
        }
        let key = KeyString::new(&kstr);
        if kws.insert(key.clone(), decode_word(v)).is_some() {
            warnings.push(Warning::DuplicateKey(key));
        }
    }
    Ok(kws)
}

/// Parse a supplemental TEXT segment using the primary segment's
/// delimiter.
///
/// The standard requires the same delimiter as primary TEXT; files differ
/// on whether the segment repeats the leading delimiter byte, so one is
/// tolerated but not required.
pub(crate) fn parse_supplemental(
    buf: &[u8],
    delim: u8,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<RawKeywords, TextError> {
    let body = match buf.first() {
        None => return Ok(RawKeywords::new()),
        Some(b) if *b == delim => &buf[1..],
        Some(_) => buf,
    };
    let words = tokenize(body, delim, conf.literal_delimiters, warnings);
    pair_words(words, warnings)
}

/// Fold supplemental TEXT keywords into the primary set.
///
/// Required keywords must live in primary TEXT, so on collision the
/// primary value is authoritative.
pub(crate) fn merge_supplemental(
    kws: &mut RawKeywords,
    supp: RawKeywords,
    warnings: &mut Vec<Warning>,
) {
    for (k, v) in supp {
        if kws.contains_key(&k) {
            warnings.push(Warning::SupplementalDuplicateKey(k));
        } else {
            kws.insert(k, v);
        }
    }
}

/// Decode word bytes, trying UTF-8 before falling back to Latin-1.
///
/// Latin-1 maps every byte, so nothing is rejected here; non-ASCII keys
/// are flagged separately.
fn decode_word(xs: Vec<u8>) -> String {
    match String::from_utf8(xs) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
