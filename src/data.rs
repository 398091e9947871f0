//! DATA segment decoding.
//!
//! The resolved metadata fixes a layout (integer, float, double, or ASCII)
//! and the decoder produces one flat, row-major buffer of
//! `$PAR x $TOT` values. Reshaping into a table is the caller's concern;
//! no 2-D structure is allocated here.

use crate::config::ReadConfig;
use crate::error::{BitWidthError, FcsError, Warning};
use crate::keywords::{AlphaNumType, BitWidth, ByteOrd, Endian};
use crate::metadata::Metadata;
use crate::numeric::{range_mask, uint_from_ordered, BitReader, NumProps};
use crate::segment::{Segment, SegmentId};

use serde::Serialize;
use std::io;

/// The decoded DATA segment: a single flat buffer, event-major.
///
/// Event `i`, channel `j` lives at index `i * parameter_count + j`.
/// Integer and ASCII layouts widen every value to `u64`; float layouts
/// keep their native precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventData {
    Uint(Vec<u64>),
    Single(Vec<f32>),
    Double(Vec<f64>),
}

impl EventData {
    pub fn len(&self) -> usize {
        match self {
            EventData::Uint(xs) => xs.len(),
            EventData::Single(xs) => xs.len(),
            EventData::Double(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `i` widened to `f64`, for callers that want one
    /// uniform numeric view.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            EventData::Uint(xs) => xs.get(i).map(|x| *x as f64),
            EventData::Single(xs) => xs.get(i).map(|x| f64::from(*x)),
            EventData::Double(xs) => xs.get(i).copied(),
        }
    }
}

/// How the DATA bytes map onto values, derived from `$DATATYPE`, `$PnB`,
/// `$PnR`, and `$BYTEORD`.
#[derive(Debug, Clone)]
pub(crate) enum DataLayout {
    /// Byte-aligned unsigned integers; widths in bytes per channel.
    FixedInt {
        widths: Vec<u32>,
        masks: Vec<u64>,
        byteord: ByteOrd,
    },
    /// Bit-packed unsigned integers; widths in bits per channel.
    PackedInt { widths: Vec<u32>, masks: Vec<u64> },
    Float(Endian),
    Double(Endian),
    /// Fixed-width ASCII; widths in characters per channel.
    FixedAscii { widths: Vec<u32> },
    /// Whitespace/comma-delimited ASCII.
    DelimitedAscii,
}

impl DataLayout {
    pub(crate) fn new(md: &Metadata, conf: &ReadConfig) -> Result<DataLayout, FcsError> {
        match md.datatype {
            AlphaNumType::Float => float_layout(md, 32).map(DataLayout::Float),
            AlphaNumType::Double => float_layout(md, 64).map(DataLayout::Double),
            AlphaNumType::Integer => int_layout(md, conf),
            AlphaNumType::Ascii => ascii_layout(md),
        }
    }

    /// Bytes per event for layouts with a fixed row size.
    fn event_nbytes(&self, par: usize) -> Option<u64> {
        match self {
            DataLayout::FixedInt { widths, .. } | DataLayout::FixedAscii { widths } => {
                Some(widths.iter().map(|w| u64::from(*w)).sum())
            }
            DataLayout::Float(_) => Some(4 * par as u64),
            DataLayout::Double(_) => Some(8 * par as u64),
            DataLayout::PackedInt { .. } | DataLayout::DelimitedAscii => None,
        }
    }
}

fn float_layout(md: &Metadata, expected: u32) -> Result<Endian, FcsError> {
    for p in &md.parameters {
        if p.bit_width != BitWidth::Fixed(expected) {
            return Err(BitWidthError::NotFloatWidth {
                index: p.index,
                expected,
            }
            .into());
        }
    }
    md.byteord.as_endian().ok_or_else(|| {
        FcsError::UnsupportedByteOrder(format!(
            "{} cannot apply to $DATATYPE={}",
            md.byteord, md.datatype
        ))
    })
}

fn int_layout(md: &Metadata, conf: &ReadConfig) -> Result<DataLayout, FcsError> {
    let mut bits = Vec::with_capacity(md.par);
    let mut masks = Vec::with_capacity(md.par);
    for p in &md.parameters {
        let b = match p.bit_width {
            BitWidth::Variable => {
                return Err(BitWidthError::VariableOutsideAscii { index: p.index }.into())
            }
            BitWidth::Fixed(b) => b,
        };
        if b == 0 {
            return Err(BitWidthError::Zero { index: p.index }.into());
        }
        if b > 64 {
            return Err(BitWidthError::TooWide {
                index: p.index,
                bits: b,
            }
            .into());
        }
        bits.push(b);
        masks.push(range_mask(p.range.mask_bound()));
    }
    let unaligned = md
        .parameters
        .iter()
        .zip(&bits)
        .find_map(|(p, b)| (b % 8 != 0).then_some((p.index, *b)));
    if let Some((index, b)) = unaligned {
        // sub-byte widths: tightly packed bits, only by explicit opt-in
        if !conf.tight_bit_packing {
            return Err(BitWidthError::NotByteAligned { index, bits: b }.into());
        }
        if md.byteord.as_endian().is_none() {
            return Err(BitWidthError::PackedNeedsEndian.into());
        }
        return Ok(DataLayout::PackedInt {
            widths: bits,
            masks,
        });
    }
    let widths: Vec<u32> = bits.iter().map(|b| b / 8).collect();
    if let ByteOrd::Mixed(order) = &md.byteord {
        for (p, w) in md.parameters.iter().zip(&widths) {
            if *w as usize != order.len() {
                return Err(BitWidthError::MixedOrderMismatch {
                    index: p.index,
                    bytes: *w,
                    order: order.len(),
                }
                .into());
            }
        }
    }
    Ok(DataLayout::FixedInt {
        widths,
        masks,
        byteord: md.byteord.clone(),
    })
}

fn ascii_layout(md: &Metadata) -> Result<DataLayout, FcsError> {
    let variable = md
        .parameters
        .iter()
        .filter(|p| p.bit_width == BitWidth::Variable)
        .count();
    if variable == md.par {
        return Ok(DataLayout::DelimitedAscii);
    }
    if variable > 0 {
        let p = md
            .parameters
            .iter()
            .find(|p| p.bit_width == BitWidth::Variable)
            .unwrap();
        return Err(BitWidthError::MixedVariable { index: p.index }.into());
    }
    let mut widths = Vec::with_capacity(md.par);
    for p in &md.parameters {
        match p.bit_width {
            BitWidth::Fixed(0) => return Err(BitWidthError::Zero { index: p.index }.into()),
            BitWidth::Fixed(w) => widths.push(w),
            BitWidth::Variable => unreachable!(),
        }
    }
    Ok(DataLayout::FixedAscii { widths })
}

/// Decode a DATA segment that has already been read into memory.
///
/// Returns the flat event buffer together with the event count, which for
/// 2.0 files without `$TOT` is derived from the segment length.
pub(crate) fn decode_data(
    buf: &[u8],
    md: &Metadata,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<(EventData, usize), FcsError> {
    let layout = DataLayout::new(md, conf)?;
    let (usable, tot) = usable_bytes(buf.len() as u64, &layout, md, conf, warnings)?;
    let bytes = &buf[..usable as usize];
    let events = match &layout {
        DataLayout::FixedInt {
            widths,
            masks,
            byteord,
        } => decode_fixed_int(bytes, tot, widths, masks, byteord),
        DataLayout::PackedInt { widths, masks } => decode_packed_int(bytes, tot, widths, masks),
        DataLayout::Float(endian) => EventData::Single(decode_float::<f32, 4>(bytes, *endian)),
        DataLayout::Double(endian) => EventData::Double(decode_float::<f64, 8>(bytes, *endian)),
        DataLayout::FixedAscii { widths } => decode_fixed_ascii(bytes, tot, widths)?,
        DataLayout::DelimitedAscii => return decode_delim_ascii(bytes, md),
    };
    Ok((events, tot))
}

/// Reconcile the declared segment size with the layout's event width.
///
/// Returns the number of usable bytes and the event count. A single
/// trailing byte can be forgiven when the caller opted in; writers that
/// store an exclusive end offset produce exactly that.
fn usable_bytes(
    nbytes: u64,
    layout: &DataLayout,
    md: &Metadata,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<(u64, usize), FcsError> {
    let mismatch = |expected| FcsError::InconsistentOffsets {
        id: SegmentId::Data,
        expected,
        actual: nbytes,
    };
    if let Some(event_width) = layout.event_nbytes(md.par) {
        return match md.tot {
            Some(tot) => {
                let expected = tot as u64 * event_width;
                if nbytes == expected {
                    Ok((expected, tot))
                } else if nbytes == expected + 1 && conf.allow_data_slack {
                    warnings.push(Warning::DataEndSlack);
                    Ok((expected, tot))
                } else {
                    Err(mismatch(expected))
                }
            }
            None => {
                let rem = nbytes % event_width;
                if rem == 0 {
                    Ok((nbytes, (nbytes / event_width) as usize))
                } else if rem == 1 && conf.allow_data_slack {
                    warnings.push(Warning::DataEndSlack);
                    Ok((nbytes - 1, (nbytes / event_width) as usize))
                } else {
                    Err(mismatch(nbytes - rem))
                }
            }
        };
    }
    match layout {
        DataLayout::PackedInt { widths, .. } => {
            let row_bits: u64 = widths.iter().map(|w| u64::from(*w)).sum();
            match md.tot {
                Some(tot) => {
                    let expected = (tot as u64 * row_bits).div_ceil(8);
                    if nbytes == expected {
                        Ok((expected, tot))
                    } else {
                        Err(mismatch(expected))
                    }
                }
                None => Ok((nbytes, ((nbytes * 8) / row_bits) as usize)),
            }
        }
        // delimited ASCII counts tokens, not bytes
        _ => Ok((nbytes, md.tot.unwrap_or(0))),
    }
}

fn decode_fixed_int(
    bytes: &[u8],
    tot: usize,
    widths: &[u32],
    masks: &[u64],
    byteord: &ByteOrd,
) -> EventData {
    let mut out = Vec::with_capacity(tot * widths.len());
    let mut pos = 0;
    for _ in 0..tot {
        for (w, mask) in widths.iter().zip(masks) {
            let end = pos + *w as usize;
            out.push(uint_from_ordered(&bytes[pos..end], byteord) & mask);
            pos = end;
        }
    }
    EventData::Uint(out)
}

fn decode_packed_int(bytes: &[u8], tot: usize, widths: &[u32], masks: &[u64]) -> EventData {
    let mut out = Vec::with_capacity(tot * widths.len());
    let mut reader = BitReader::new(bytes);
    for _ in 0..tot {
        for (w, mask) in widths.iter().zip(masks) {
            // length was validated up front, the stream cannot run dry
            let raw = reader.take(*w).unwrap_or(0);
            out.push(raw & mask);
        }
    }
    EventData::Uint(out)
}

fn decode_float<T, const LEN: usize>(bytes: &[u8], endian: Endian) -> Vec<T>
where
    T: NumProps<LEN>,
{
    bytes
        .chunks_exact(LEN)
        .map(|chunk| {
            // chunks_exact guarantees the length
            let buf: [u8; LEN] = chunk.try_into().unwrap();
            T::from_endian(buf, endian)
        })
        .collect()
}

fn decode_fixed_ascii(bytes: &[u8], tot: usize, widths: &[u32]) -> Result<EventData, FcsError> {
    let mut out = Vec::with_capacity(tot * widths.len());
    let mut pos = 0;
    for _ in 0..tot {
        for w in widths {
            let end = pos + *w as usize;
            out.push(ascii_to_uint(&bytes[pos..end])?);
            pos = end;
        }
    }
    Ok(EventData::Uint(out))
}

/// Decode whitespace/comma-delimited ASCII integers.
///
/// Delimiters are tab, newline, carriage return, space, or comma; any
/// consecutive run counts as one and they can be mixed.
fn decode_delim_ascii(bytes: &[u8], md: &Metadata) -> Result<(EventData, usize), FcsError> {
    let is_delim = |b: u8| b == 9 || b == 10 || b == 13 || b == 32 || b == 44;
    let tokens: Vec<_> = bytes.split(|b| is_delim(*b)).filter(|t| !t.is_empty()).collect();
    let n = tokens.len();
    let tot = match md.tot {
        Some(tot) => {
            if n != md.par * tot {
                return Err(FcsError::InconsistentOffsets {
                    id: SegmentId::Data,
                    expected: (md.par * tot) as u64,
                    actual: n as u64,
                });
            }
            tot
        }
        None => {
            if n % md.par != 0 {
                return Err(FcsError::InconsistentOffsets {
                    id: SegmentId::Data,
                    expected: (n - n % md.par) as u64,
                    actual: n as u64,
                });
            }
            n / md.par
        }
    };
    let values = tokens
        .into_iter()
        .map(ascii_to_uint)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((EventData::Uint(values), tot))
}

fn ascii_to_uint(bytes: &[u8]) -> Result<u64, FcsError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let x = s
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(x)
}

/// The DATA segment a data set will actually read, checked against the
/// end of the file before any decoding starts.
pub(crate) fn check_in_file(seg: Segment, base: u64, file_size: u64) -> Result<(), FcsError> {
    if let Some((_, end)) = seg.bounds() {
        let needed = base + end + 1;
        if needed > file_size {
            return Err(FcsError::TruncatedData {
                id: SegmentId::Data,
                needed,
                available: file_size,
            });
        }
    }
    Ok(())
}
