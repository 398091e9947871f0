//! Typed values for the standard (`$`-prefixed) TEXT keywords.
//!
//! Each type knows how to parse itself from the raw keyword string and how
//! to print itself back in the form the standard expects, so `FromStr` and
//! `Display` are inverses wherever the standard allows a canonical form.

use crate::error::{FcsError, Warning};
use crate::text::{KeyString, RawKeywords};

use derive_more::{AsRef, Display, From, FromStr, Into};
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The value of the $DATATYPE keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlphaNumType {
    Ascii,
    Integer,
    Float,
    Double,
}

#[derive(Debug)]
pub struct AlphaNumTypeError(String);

impl FromStr for AlphaNumType {
    type Err = AlphaNumTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // keyword *values* are case-preserving but real files use both cases
        match s.trim() {
            "A" | "a" => Ok(AlphaNumType::Ascii),
            "I" | "i" => Ok(AlphaNumType::Integer),
            "F" | "f" => Ok(AlphaNumType::Float),
            "D" | "d" => Ok(AlphaNumType::Double),
            _ => Err(AlphaNumTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for AlphaNumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let x = match self {
            AlphaNumType::Ascii => "A",
            AlphaNumType::Integer => "I",
            AlphaNumType::Float => "F",
            AlphaNumType::Double => "D",
        };
        write!(f, "{x}")
    }
}

impl fmt::Display for AlphaNumTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "$DATATYPE must be one of I, F, D, or A; found '{}'", self.0)
    }
}

/// The value of the $MODE keyword.
///
/// Only list mode survives in practice; the histogram modes were
/// deprecated in 3.1 and no decoder for them exists here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    List,
    Uncorrelated,
    Correlated,
}

#[derive(Debug)]
pub struct ModeError(String);

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" | "l" => Ok(Mode::List),
            "U" | "u" => Ok(Mode::Uncorrelated),
            "C" | "c" => Ok(Mode::Correlated),
            _ => Err(ModeError(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let x = match self {
            Mode::List => "L",
            Mode::Uncorrelated => "U",
            Mode::Correlated => "C",
        };
        write!(f, "{x}")
    }
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "$MODE must be one of L, U, or C; found '{}'", self.0)
    }
}

/// Endianness, as stored in $BYTEORD for 3.1 (and most earlier files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn is_big(&self) -> bool {
        matches!(self, Endian::Big)
    }
}

pub struct EndianError(String);

impl FromStr for Endian {
    type Err = EndianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1,2,3,4" | "1,2" => Ok(Endian::Little),
            "4,3,2,1" | "2,1" => Ok(Endian::Big),
            _ => Err(EndianError(s.to_string())),
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let x = match self {
            Endian::Big => "4,3,2,1",
            Endian::Little => "1,2,3,4",
        };
        write!(f, "{x}")
    }
}

impl fmt::Display for EndianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "$BYTEORD must be either 1,2,3,4 or 4,3,2,1; found '{}'", self.0)
    }
}

/// The byte order as shown in the $BYTEORD keyword for 2.0 and 3.0.
///
/// Besides the two endian forms, 2.0/3.0 technically permit any
/// permutation of `1..n` for integer data. `Mixed` holds the 0-based
/// significance of each file byte: file byte `i` contributes
/// `buf[i] << (8 * order[i])`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ByteOrd {
    Endian(Endian),
    Mixed(Vec<u8>),
}

impl ByteOrd {
    pub fn new(xs: Vec<u8>) -> Option<Self> {
        match xs[..] {
            [1, 2] | [1, 2, 3, 4] => Some(ByteOrd::Endian(Endian::Little)),
            [2, 1] | [4, 3, 2, 1] => Some(ByteOrd::Endian(Endian::Big)),
            _ => {
                let n = xs.len();
                if n == 0
                    || n > 8
                    || xs.iter().unique().count() != n
                    || xs.iter().min().is_some_and(|x| *x != 1)
                    || xs.iter().max().is_some_and(|x| usize::from(*x) != n)
                {
                    None
                } else {
                    Some(ByteOrd::Mixed(xs.iter().map(|x| x - 1).collect()))
                }
            }
        }
    }

    pub fn as_endian(&self) -> Option<Endian> {
        match self {
            ByteOrd::Endian(e) => Some(*e),
            ByteOrd::Mixed(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ByteOrdError {
    InvalidOrder(String),
    InvalidNumbers(String),
}

impl FromStr for ByteOrd {
    type Err = ByteOrdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse() {
            Ok(e) => Ok(ByteOrd::Endian(e)),
            _ => {
                let (pass, fail): (Vec<_>, Vec<_>) = s
                    .trim()
                    .split(',')
                    .map(|x| x.trim().parse::<u8>())
                    .partition_result();
                if fail.is_empty() {
                    ByteOrd::new(pass).ok_or_else(|| ByteOrdError::InvalidOrder(s.to_string()))
                } else {
                    Err(ByteOrdError::InvalidNumbers(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for ByteOrd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ByteOrd::Endian(e) => write!(f, "{e}"),
            ByteOrd::Mixed(xs) => write!(f, "{}", xs.iter().map(|x| x + 1).join(",")),
        }
    }
}

impl fmt::Display for ByteOrdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ByteOrdError::InvalidOrder(s) => {
                write!(f, "$BYTEORD '{s}' must permute 1-n uniquely")
            }
            ByteOrdError::InvalidNumbers(s) => {
                write!(f, "could not parse numbers in $BYTEORD '{s}'")
            }
        }
    }
}

/// The value of a $PnR keyword.
///
/// The standard calls for an integer, but files write floats here often
/// enough (especially for float data) that both must parse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Range {
    Int(u64),
    Float(f64),
}

#[derive(Debug)]
pub struct RangeError(String);

impl Range {
    /// The exclusive upper bound used for integer bitmasking.
    pub(crate) fn mask_bound(&self) -> u64 {
        match self {
            Range::Int(x) => *x,
            Range::Float(x) if *x <= 0.0 => 0,
            Range::Float(x) if *x >= u64::MAX as f64 => u64::MAX,
            Range::Float(x) => x.ceil() as u64,
        }
    }
}

impl FromStr for Range {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        t.parse::<u64>().map(Range::Int).or_else(|_| {
            t.parse::<f64>()
                .map(Range::Float)
                .map_err(|_| RangeError(s.to_string()))
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Range::Int(x) => write!(f, "{x}"),
            Range::Float(x) => write!(f, "{x}"),
        }
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "range '{}' is neither an integer nor a float", self.0)
    }
}

/// The value of a $PnB keyword: a fixed bit width, or `*` for
/// delimited ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BitWidth {
    Fixed(u32),
    Variable,
}

#[derive(Debug)]
pub struct BitWidthParseError(String);

impl FromStr for BitWidth {
    type Err = BitWidthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t == "*" {
            Ok(BitWidth::Variable)
        } else {
            t.parse()
                .map(BitWidth::Fixed)
                .map_err(|_| BitWidthParseError(s.to_string()))
        }
    }
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            BitWidth::Fixed(x) => write!(f, "{x}"),
            BitWidth::Variable => write!(f, "*"),
        }
    }
}

impl fmt::Display for BitWidthParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "bit width '{}' must be a positive integer or '*'", self.0)
    }
}

/// The value of a $PnE keyword: 'decades,offset'.
///
/// `0,0` is linear; anything else declares log-amplified storage. A log
/// scale with a zero offset is technically invalid and parses to a
/// dedicated error so the caller can apply the standard's 1.0 repair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Scale {
    Linear,
    Log { decades: f32, offset: f32 },
}

#[derive(Debug)]
pub enum ScaleError {
    WrongFormat(String),
    ZeroOffset { decades: f32 },
    NonPositive { decades: f32, offset: f32 },
}

impl FromStr for Scale {
    type Err = ScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ScaleError::WrongFormat(s.to_string());
        match s.split(',').collect::<Vec<_>>()[..] {
            [ds, os] => {
                let decades: f32 = ds.trim().parse().map_err(|_| bad())?;
                let offset: f32 = os.trim().parse().map_err(|_| bad())?;
                match (decades, offset) {
                    (0.0, 0.0) => Ok(Scale::Linear),
                    (d, 0.0) if d > 0.0 => Err(ScaleError::ZeroOffset { decades: d }),
                    (d, o) if d > 0.0 && o > 0.0 => Ok(Scale::Log {
                        decades: d,
                        offset: o,
                    }),
                    (d, o) => Err(ScaleError::NonPositive {
                        decades: d,
                        offset: o,
                    }),
                }
            }
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Scale::Linear => write!(f, "0,0"),
            Scale::Log { decades, offset } => write!(f, "{decades},{offset}"),
        }
    }
}

impl fmt::Display for ScaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ScaleError::WrongFormat(s) => write!(f, "$PnE '{s}' must be like 'f1,f2'"),
            ScaleError::ZeroOffset { decades } => {
                write!(f, "log scale '{decades},0' has a zero offset")
            }
            ScaleError::NonPositive { decades, offset } => {
                write!(f, "log scale '{decades},{offset}' must be positive")
            }
        }
    }
}

/// The value of a $PnG keyword (amplifier gain, 3.0+).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, From, Into, Display, FromStr)]
pub struct Gain(pub f32);

/// The value of a $PnN keyword (short channel name).
///
/// Names may not contain commas since several keywords embed them in
/// comma-separated lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, AsRef, Display)]
#[as_ref(str)]
pub struct Shortname(String);

#[derive(Debug)]
pub struct ShortnameError(String);

impl Shortname {
    pub fn new(s: &str) -> Result<Shortname, ShortnameError> {
        if s.contains(',') {
            Err(ShortnameError(s.to_string()))
        } else {
            Ok(Shortname(s.to_string()))
        }
    }

    /// Wrap a name without the comma check; used when reading, where the
    /// file's contents are reported as-is.
    pub(crate) fn new_unchecked(s: &str) -> Shortname {
        Shortname(s.to_string())
    }
}

impl FromStr for Shortname {
    type Err = ShortnameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shortname::new(s)
    }
}

impl fmt::Display for ShortnameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "channel name '{}' must not contain commas", self.0)
    }
}

/// Lowercased names of the non-indexed standard keywords.
pub(crate) mod keys {
    pub const PAR: &str = "$par";
    pub const TOT: &str = "$tot";
    pub const MODE: &str = "$mode";
    pub const DATATYPE: &str = "$datatype";
    pub const BYTEORD: &str = "$byteord";
    pub const NEXTDATA: &str = "$nextdata";
    pub const BEGINDATA: &str = "$begindata";
    pub const ENDDATA: &str = "$enddata";
    pub const BEGINANALYSIS: &str = "$beginanalysis";
    pub const ENDANALYSIS: &str = "$endanalysis";
    pub const BEGINSTEXT: &str = "$beginstext";
    pub const ENDSTEXT: &str = "$endstext";

    /// Build an indexed measurement key such as `$p3b`.
    pub fn pn(i: usize, suffix: char) -> String {
        format!("$p{i}{suffix}")
    }
}

/// Look up and parse a required keyword.
pub(crate) fn get_req<T>(kws: &RawKeywords, key: &str) -> Result<T, FcsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let k = KeyString::new(key);
    let v = kws
        .get(&k)
        .ok_or_else(|| FcsError::MissingRequiredKeyword(k.clone()))?;
    // values are stored verbatim; padding is shed only for parsing
    v.trim().parse().map_err(|e: T::Err| FcsError::InvalidKeyword {
        key: k,
        value: v.clone(),
        msg: e.to_string(),
    })
}

/// Look up and parse an optional keyword.
///
/// An unparseable value is downgraded to a warning and `None`; a file
/// should not become unreadable over a keyword the caller may never use.
pub(crate) fn get_opt<T>(kws: &RawKeywords, key: &str, warnings: &mut Vec<Warning>) -> Option<T>
where
    T: FromStr,
{
    let k = KeyString::new(key);
    let v = kws.get(&k)?;
    match v.trim().parse() {
        Ok(x) => Some(x),
        Err(_) => {
            warnings.push(Warning::BadOptionalValue {
                key: k,
                value: v.clone(),
            });
            None
        }
    }
}

/// Raw access to a keyword value.
pub(crate) fn get_raw<'a>(kws: &'a RawKeywords, key: &str) -> Option<&'a str> {
    kws.get(&KeyString::new(key)).map(|s| s.as_str())
}
