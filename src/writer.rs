//! FCS 3.1 file emission.
//!
//! The writer lays the file out in one forward pass with fixed-width
//! placeholders for every offset value, then seeks back to patch the
//! HEADER fields and the TEXT offset keywords. The placeholders are 20
//! ASCII digits, wide enough for any position the layout can reach, which
//! keeps the TEXT length independent of the offset magnitudes and breaks
//! the circular dependency between the two.

use crate::config::WriteConfig;
use crate::data::EventData;
use crate::error::{BitWidthError, FcsError, Warning};
use crate::header::format_header_offsets;
use crate::keywords::{AlphaNumType, Endian, Gain, Range, Scale, Shortname};
use crate::numeric::{range_mask, uint_to_ordered, NumProps};
use crate::segment::Segment;
use crate::text::KeyString;

use nonempty::NonEmpty;
use std::fs;
use std::io;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Width of every offset value placeholder in TEXT.
const OFFSET_VAL_LEN: usize = 20;

/// `$NEXTDATA` is capped at 99,999,999 by the HEADER convention, so its
/// value always fits 8 digits.
const NEXTDATA_VAL_LEN: usize = 8;

/// One output channel.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    /// `$PnN`.
    pub short_name: Shortname,
    /// `$PnB` in bits: 32 for float, 64 for double, any multiple of 8 up
    /// to 64 for integer data.
    pub bit_width: u32,
    /// `$PnR`. For integer data this also fixes the bitmask applied to
    /// outgoing values.
    pub range: Range,
    /// `$PnE`.
    pub scale: Scale,
    /// `$PnS`, emitted only when present.
    pub long_name: Option<String>,
    /// `$PnG`, emitted only when present.
    pub gain: Option<Gain>,
}

impl ChannelSpec {
    /// A 32-bit float channel with a linear scale and the customary
    /// 2^18 display range.
    pub fn float(short_name: Shortname) -> ChannelSpec {
        ChannelSpec {
            short_name,
            bit_width: 32,
            range: Range::Int(262_144),
            scale: Scale::Linear,
            long_name: None,
            gain: None,
        }
    }

    /// An unsigned integer channel of the given width and range.
    pub fn uint(short_name: Shortname, bit_width: u32, range: u64) -> ChannelSpec {
        ChannelSpec {
            short_name,
            bit_width,
            range: Range::Int(range),
            scale: Scale::Linear,
            long_name: None,
            gain: None,
        }
    }
}

/// Everything the writer needs besides the event values themselves.
#[derive(Debug, Clone)]
pub struct WriterSpec {
    /// `$DATATYPE`; must agree with the [`EventData`] variant handed to
    /// [`write`].
    pub datatype: AlphaNumType,
    /// `$BYTEORD` for the emitted scalars.
    pub endian: Endian,
    pub channels: NonEmpty<ChannelSpec>,
    /// Additional TEXT keywords, written in order after the computed ones.
    /// Reserved keywords are dropped with a warning.
    pub extra_text: Vec<(String, String)>,
    /// ANALYSIS keywords; the segment is omitted when empty.
    pub analysis: Vec<(String, String)>,
}

impl WriterSpec {
    /// Little-endian binary32 output, the format everything downstream
    /// reads happily.
    pub fn float(channels: NonEmpty<ChannelSpec>) -> WriterSpec {
        WriterSpec {
            datatype: AlphaNumType::Float,
            endian: Endian::Little,
            channels,
            extra_text: Vec::new(),
            analysis: Vec::new(),
        }
    }

    /// Little-endian binary64 output.
    pub fn double(channels: NonEmpty<ChannelSpec>) -> WriterSpec {
        WriterSpec {
            datatype: AlphaNumType::Double,
            ..WriterSpec::float(channels)
        }
    }

    /// Little-endian unsigned integer output with per-channel widths.
    pub fn uint(channels: NonEmpty<ChannelSpec>) -> WriterSpec {
        WriterSpec {
            datatype: AlphaNumType::Integer,
            ..WriterSpec::float(channels)
        }
    }
}

/// Write one data set to a sink.
///
/// The sink's current position becomes the data set's origin, so data
/// sets can be appended back to back. Returns the non-fatal findings
/// (dropped reserved keywords, clamped values).
///
/// Reading the output back yields the same events and, for user-supplied
/// keywords, the same TEXT values.
pub fn write<W: Write + Seek>(
    sink: W,
    events: &EventData,
    spec: &WriterSpec,
    conf: &WriteConfig,
) -> Result<Vec<Warning>, FcsError> {
    let mut h = BufWriter::new(sink);
    let warnings = h_write_data_set(&mut h, events, spec, conf)?;
    h.flush()?;
    Ok(warnings)
}

/// Write one data set to a file on disk.
pub fn write_fcs_file<P: AsRef<Path>>(
    p: P,
    events: &EventData,
    spec: &WriterSpec,
    conf: &WriteConfig,
) -> Result<Vec<Warning>, FcsError> {
    let file = fs::File::create(p)?;
    write(file, events, spec, conf)
}

pub(crate) fn h_write_data_set<W: Write + Seek>(
    h: &mut BufWriter<W>,
    events: &EventData,
    spec: &WriterSpec,
    conf: &WriteConfig,
) -> Result<Vec<Warning>, FcsError> {
    let mut warnings = Vec::new();
    let par = spec.channels.len();
    if events.len() % par != 0 {
        return Err(FcsError::InvalidEventShape {
            len: events.len(),
            par,
        });
    }
    let tot = events.len() / par;
    let row_nbytes = validate_widths(spec)?;
    let data_nbytes = row_nbytes * tot as u64;

    let origin = h.stream_position()?;
    let delim = conf.delim.inner();

    // placeholder HEADER: magic + version, then spaces where the offsets
    // will land
    h.write_all(b"FCS3.1    ")?;
    h.write_all(&[b' '; 48])?;

    let (text, slots) = build_text(spec, par, tot, delim, &mut warnings);
    let text_len = text.len() as u64;
    if crate::header::HEADER_LEN as u64 + text_len - 1 > 99_999_999 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "TEXT segment does not fit the HEADER offset fields",
        )
        .into());
    }
    h.write_all(&text)?;

    write_events(h, events, spec, &mut warnings)?;

    let abuf = build_analysis(&spec.analysis, delim);
    h.write_all(&abuf)?;
    let end_pos = h.stream_position()?;

    // segment arithmetic, all relative to origin
    let text_begin = crate::header::HEADER_LEN as u64;
    let text_seg = Segment::new(text_begin, text_begin + text_len - 1);
    let data_begin = text_begin + text_len;
    let data_seg = if data_nbytes > 0 {
        Segment::new(data_begin, data_begin + data_nbytes - 1)
    } else {
        Segment::Empty
    };
    let analysis_begin = data_begin + data_nbytes;
    let analysis_seg = if abuf.is_empty() {
        Segment::Empty
    } else {
        Segment::new(analysis_begin, analysis_begin + abuf.len() as u64 - 1)
    };

    // back-patch the TEXT offset placeholders
    patch_slot(h, origin, text_begin, slots.begin_data, data_seg, true)?;
    patch_slot(h, origin, text_begin, slots.end_data, data_seg, false)?;
    patch_slot(h, origin, text_begin, slots.begin_analysis, analysis_seg, true)?;
    patch_slot(h, origin, text_begin, slots.end_analysis, analysis_seg, false)?;

    // back-patch the HEADER offset fields
    h.seek(SeekFrom::Start(origin + 10))?;
    h.write_all(format_header_offsets(text_seg).as_bytes())?;
    h.write_all(format_header_offsets(data_seg).as_bytes())?;
    h.write_all(format_header_offsets(analysis_seg).as_bytes())?;

    h.seek(SeekFrom::Start(end_pos))?;
    Ok(warnings)
}

/// Check the channel widths against the datatype and return the row size
/// in bytes.
fn validate_widths(spec: &WriterSpec) -> Result<u64, FcsError> {
    let mut row = 0u64;
    for (i, c) in spec.channels.iter().enumerate() {
        let index = i + 1;
        let bits = c.bit_width;
        match spec.datatype {
            AlphaNumType::Float => {
                if bits != 32 {
                    return Err(BitWidthError::NotFloatWidth {
                        index,
                        expected: 32,
                    }
                    .into());
                }
            }
            AlphaNumType::Double => {
                if bits != 64 {
                    return Err(BitWidthError::NotFloatWidth {
                        index,
                        expected: 64,
                    }
                    .into());
                }
            }
            AlphaNumType::Integer => {
                if bits == 0 {
                    return Err(BitWidthError::Zero { index }.into());
                }
                if bits > 64 {
                    return Err(BitWidthError::TooWide { index, bits }.into());
                }
                if bits % 8 != 0 {
                    return Err(BitWidthError::NotByteAligned { index, bits }.into());
                }
            }
            AlphaNumType::Ascii => {
                return Err(FcsError::UnsupportedDataType(
                    "writing $DATATYPE=A is not supported".to_string(),
                ))
            }
        }
        row += u64::from(bits / 8);
    }
    Ok(row)
}

/// Byte offsets (relative to the start of TEXT) of the four offset value
/// placeholders that need patching.
struct OffsetSlots {
    begin_analysis: usize,
    end_analysis: usize,
    begin_data: usize,
    end_data: usize,
}

/// Serialize the TEXT segment with placeholder offsets.
fn build_text(
    spec: &WriterSpec,
    par: usize,
    tot: usize,
    delim: u8,
    warnings: &mut Vec<Warning>,
) -> (Vec<u8>, OffsetSlots) {
    let mut w = TextBuf::new(delim);
    let zeros20 = "0".repeat(OFFSET_VAL_LEN);

    let begin_analysis = w.pair_slot("$BEGINANALYSIS");
    let begin_data = w.pair_slot("$BEGINDATA");
    w.pair("$BEGINSTEXT", &zeros20);
    w.pair("$BYTEORD", &spec.endian.to_string());
    w.pair("$DATATYPE", &spec.datatype.to_string());
    let end_analysis = w.pair_slot("$ENDANALYSIS");
    let end_data = w.pair_slot("$ENDDATA");
    w.pair("$ENDSTEXT", &zeros20);
    w.pair("$MODE", "L");
    w.pair("$NEXTDATA", &"0".repeat(NEXTDATA_VAL_LEN));
    w.pair("$PAR", &par.to_string());
    w.pair("$TOT", &tot.to_string());

    for (i, c) in spec.channels.iter().enumerate() {
        let n = i + 1;
        w.pair(&format!("$P{n}B"), &c.bit_width.to_string());
        w.pair(&format!("$P{n}E"), &c.scale.to_string());
        w.pair(&format!("$P{n}N"), c.short_name.as_ref());
        w.pair(&format!("$P{n}R"), &c.range.to_string());
        if let Some(s) = &c.long_name {
            w.pair(&format!("$P{n}S"), s);
        }
        if let Some(g) = &c.gain {
            w.pair(&format!("$P{n}G"), &g.to_string());
        }
    }

    for (k, v) in &spec.extra_text {
        if is_reserved(k, par) {
            warnings.push(Warning::ReservedKeywordDropped(KeyString::new(k)));
        } else {
            w.pair(k, v);
        }
    }

    (
        w.buf,
        OffsetSlots {
            begin_analysis,
            end_analysis,
            begin_data,
            end_data,
        },
    )
}

/// The computed keywords may not be overridden from the outside; the
/// offsets, shape, and per-channel storage keywords all describe the
/// layout this writer controls.
fn is_reserved(key: &str, par: usize) -> bool {
    let k = key.to_ascii_lowercase();
    let k = k.as_str();
    if matches!(
        k,
        "$beginanalysis"
            | "$begindata"
            | "$beginstext"
            | "$byteord"
            | "$datatype"
            | "$endanalysis"
            | "$enddata"
            | "$endstext"
            | "$mode"
            | "$nextdata"
            | "$par"
            | "$tot"
    ) {
        return true;
    }
    k.strip_prefix("$p")
        .and_then(|rest| rest.strip_suffix(['b', 'e', 'n', 'r', 's', 'g']))
        .and_then(|digits| digits.parse::<usize>().ok())
        .is_some_and(|n| (1..=par).contains(&n))
}

/// A TEXT segment under construction: leading delimiter, then
/// `key<d>value<d>` pairs with embedded delimiters escaped by doubling.
struct TextBuf {
    buf: Vec<u8>,
    delim: u8,
}

impl TextBuf {
    fn new(delim: u8) -> TextBuf {
        TextBuf {
            buf: vec![delim],
            delim,
        }
    }

    fn push_escaped(&mut self, s: &str) {
        for b in s.bytes() {
            self.buf.push(b);
            if b == self.delim {
                self.buf.push(b);
            }
        }
    }

    fn pair(&mut self, key: &str, value: &str) {
        self.push_escaped(key);
        self.buf.push(self.delim);
        self.push_escaped(value);
        self.buf.push(self.delim);
    }

    /// Write a pair whose value is a 20-digit placeholder; returns the
    /// placeholder's offset within the TEXT segment.
    fn pair_slot(&mut self, key: &str) -> usize {
        self.push_escaped(key);
        self.buf.push(self.delim);
        let at = self.buf.len();
        self.buf.resize(at + OFFSET_VAL_LEN, b'0');
        self.buf.push(self.delim);
        at
    }
}

fn build_analysis(pairs: &[(String, String)], delim: u8) -> Vec<u8> {
    if pairs.is_empty() {
        return Vec::new();
    }
    let mut w = TextBuf::new(delim);
    for (k, v) in pairs {
        w.pair(k, v);
    }
    w.buf
}

fn write_events<W: Write>(
    h: &mut BufWriter<W>,
    events: &EventData,
    spec: &WriterSpec,
    warnings: &mut Vec<Warning>,
) -> Result<(), FcsError> {
    let par = spec.channels.len();
    match (spec.datatype, events) {
        (AlphaNumType::Float, EventData::Single(xs)) => {
            for x in xs {
                h.write_all(&x.to_endian(spec.endian))?;
            }
        }
        (AlphaNumType::Double, EventData::Double(xs)) => {
            for x in xs {
                h.write_all(&x.to_endian(spec.endian))?;
            }
        }
        (AlphaNumType::Integer, EventData::Uint(xs)) => {
            let masks: Vec<u64> = spec
                .channels
                .iter()
                .map(|c| range_mask(c.range.mask_bound()))
                .collect();
            let widths: Vec<usize> = spec
                .channels
                .iter()
                .map(|c| (c.bit_width / 8) as usize)
                .collect();
            let mut clamped = vec![false; par];
            for (i, x) in xs.iter().enumerate() {
                let j = i % par;
                let value = if *x > masks[j] {
                    if !clamped[j] {
                        clamped[j] = true;
                        warnings.push(Warning::ValueClamped { index: j + 1 });
                    }
                    masks[j]
                } else {
                    *x
                };
                let bytes = uint_to_ordered(value, widths[j], spec.endian);
                h.write_all(&bytes[..widths[j]])?;
            }
        }
        (datatype, _) => return Err(FcsError::EventTypeMismatch(datatype)),
    }
    Ok(())
}

/// Patch one 20-digit offset placeholder in the already-written TEXT.
fn patch_slot<W: Write + Seek>(
    h: &mut BufWriter<W>,
    origin: u64,
    text_begin: u64,
    slot: usize,
    seg: Segment,
    is_begin: bool,
) -> io::Result<()> {
    let value = match seg.bounds() {
        Some((b, e)) => {
            if is_begin {
                b
            } else {
                e
            }
        }
        None => 0,
    };
    h.seek(SeekFrom::Start(origin + text_begin + slot as u64))?;
    h.write_all(format!("{value:020}").as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reserved() {
        assert!(is_reserved("$TOT", 2));
        assert!(is_reserved("$p1n", 2));
        assert!(is_reserved("$P2R", 2));
        assert!(!is_reserved("$P3R", 2));
        assert!(!is_reserved("$CYT", 2));
        assert!(!is_reserved("p1n", 2));
        assert!(!is_reserved("$PXB", 2));
    }

    #[test]
    fn test_text_escaping() {
        let mut w = TextBuf::new(b'|');
        w.pair("$FIL", "my|file.fcs");
        assert_eq!(w.buf, b"|$FIL|my||file.fcs|");
    }
}
