//! Data set assembly and the public reading interface.
//!
//! A data set is HEADER + TEXT (+ supplemental TEXT) + DATA (+ ANALYSIS).
//! Files may chain several data sets through `$NEXTDATA`;
//! [`read_multiple`] walks the chain lazily.

use crate::config::ReadConfig;
use crate::data::{check_in_file, decode_data, EventData};
use crate::error::{FcsError, Warning};
use crate::header::{h_read_header, Header, Version};
use crate::metadata::{resolve_metadata, supplemental_text_segment, Parameter};
use crate::segment::{Segment, SegmentId};
use crate::text::{merge_supplemental, parse_raw_text, parse_supplemental, RawKeywords};

use serde::Serialize;
use std::fs;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// One fully decoded FCS data set.
///
/// Immutable once returned; the reader has consumed every byte it needs,
/// so the value owns all of its storage and is safe to move across
/// threads.
#[derive(Debug, Clone, Serialize)]
pub struct DataSet {
    /// Version from this data set's HEADER.
    pub version: Version,

    /// Every TEXT keyword (primary and supplemental), keys normalized to
    /// lowercase, values verbatim.
    pub text: RawKeywords,

    /// `$PAR`.
    pub parameter_count: usize,

    /// `$TOT`, or the derived count for 2.0 files that omit it.
    pub event_count: usize,

    /// Per-channel records, ordered by their 1-based keyword index.
    pub channels: Vec<Parameter>,

    /// The flat, event-major value buffer;
    /// `events.len() == parameter_count * event_count`.
    pub events: EventData,

    /// Keywords from the ANALYSIS segment; empty when absent.
    pub analysis: RawKeywords,

    /// Absolute byte offset of the next data set's HEADER, or 0 if this is
    /// the last one.
    pub next_data_offset: u64,

    /// The TEXT delimiter byte, kept for diagnostics.
    pub delimiter: u8,

    /// Non-fatal findings collected along the way.
    pub warnings: Vec<Warning>,
}

/// HEADER and TEXT of a data set, without touching DATA.
///
/// Useful for skimming metadata out of large files.
#[derive(Debug, Clone, Serialize)]
pub struct TextData {
    pub version: Version,
    pub delimiter: u8,
    pub keywords: RawKeywords,
    pub warnings: Vec<Warning>,
}

/// Parse the first data set of an FCS byte source.
pub fn read<R: Read + Seek>(source: R, conf: &ReadConfig) -> Result<DataSet, FcsError> {
    let mut h = BufReader::new(source);
    h_read_data_set(&mut h, 0, conf)
}

/// Iterate over every data set in an FCS byte source, following
/// `$NEXTDATA` until it reaches 0.
///
/// The iterator is finite and not restartable; it stops after the last
/// data set or the first error.
pub fn read_multiple<R: Read + Seek>(source: R, conf: &ReadConfig) -> DataSetIter<R> {
    DataSetIter {
        h: BufReader::new(source),
        conf: conf.clone(),
        next: Some(0),
    }
}

/// Parse the first data set of an FCS file on disk.
pub fn read_fcs_file<P: AsRef<Path>>(p: P, conf: &ReadConfig) -> Result<DataSet, FcsError> {
    let file = fs::File::options().read(true).open(p)?;
    read(file, conf)
}

/// Parse every data set of an FCS file on disk.
pub fn read_fcs_data_sets<P: AsRef<Path>>(
    p: P,
    conf: &ReadConfig,
) -> Result<Vec<DataSet>, FcsError> {
    let file = fs::File::options().read(true).open(p)?;
    read_multiple(file, conf).collect()
}

/// Parse only the HEADER and TEXT of the first data set of an FCS file,
/// leaving the event data untouched.
pub fn read_fcs_text<P: AsRef<Path>>(p: P, conf: &ReadConfig) -> Result<TextData, FcsError> {
    let file = fs::File::options().read(true).open(p)?;
    let mut h = BufReader::new(file);
    let mut warnings = Vec::new();
    let (header, delimiter, keywords) = h_read_raw_text(&mut h, 0, conf, &mut warnings)?;
    Ok(TextData {
        version: header.version,
        delimiter,
        keywords,
        warnings,
    })
}

/// Lazy multi-data-set iterator returned by [`read_multiple`].
pub struct DataSetIter<R> {
    h: BufReader<R>,
    conf: ReadConfig,
    next: Option<u64>,
}

impl<R: Read + Seek> Iterator for DataSetIter<R> {
    type Item = Result<DataSet, FcsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.next.take()?;
        match h_read_data_set(&mut self.h, base, &self.conf) {
            Ok(ds) => {
                if ds.next_data_offset > 0 {
                    self.next = Some(ds.next_data_offset);
                }
                Some(Ok(ds))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read HEADER + primary TEXT (+ supplemental TEXT, merged) starting at
/// `base`.
fn h_read_raw_text<R: Read + Seek>(
    h: &mut BufReader<R>,
    base: u64,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<(Header, u8, RawKeywords), FcsError> {
    let file_size = h.seek(SeekFrom::End(0))?;
    let header = h_read_header(h, base)?;

    let mut buf = Vec::new();
    header.text.h_read(h, base, &mut buf)?;
    check_segment_len(&buf, header.text, SegmentId::PrimaryText, base, file_size)?;
    let (delimiter, mut kws) = parse_raw_text(&buf, conf, warnings)?;

    let stext = supplemental_text_segment(&header, &kws, warnings);
    if !stext.is_empty() {
        buf.clear();
        stext.h_read(h, base, &mut buf)?;
        check_segment_len(&buf, stext, SegmentId::SupplementalText, base, file_size)?;
        let supp = parse_supplemental(&buf, delimiter, conf, warnings)?;
        merge_supplemental(&mut kws, supp, warnings);
    }
    Ok((header, delimiter, kws))
}

/// Read and decode one whole data set whose HEADER sits at `base`.
pub(crate) fn h_read_data_set<R: Read + Seek>(
    h: &mut BufReader<R>,
    base: u64,
    conf: &ReadConfig,
) -> Result<DataSet, FcsError> {
    let file_size = h.seek(SeekFrom::End(0))?;
    let mut warnings = Vec::new();
    let (header, delimiter, kws) = h_read_raw_text(h, base, conf, &mut warnings)?;
    let md = resolve_metadata(&header, &kws, conf, &mut warnings)?;

    // ANALYSIS carries TEXT's grammar with its own leading delimiter; a
    // span shorter than two bytes cannot hold a pair and counts as absent
    let analysis = if md.analysis.nbytes() >= 2 {
        let mut abuf = Vec::new();
        md.analysis.h_read(h, base, &mut abuf)?;
        check_segment_len(&abuf, md.analysis, SegmentId::Analysis, base, file_size)?;
        let (_, akws) = parse_raw_text(&abuf, conf, &mut warnings)?;
        akws
    } else {
        RawKeywords::new()
    };

    check_in_file(md.data, base, file_size)?;
    let mut dbuf = Vec::new();
    md.data.h_read(h, base, &mut dbuf)?;
    let (events, event_count) = decode_data(&dbuf, &md, conf, &mut warnings)?;

    let next_data_offset = match md.nextdata {
        0 => 0,
        rel => base
            .checked_add(rel)
            .ok_or(FcsError::InvalidNextData {
                current: base,
                next: rel,
            })?,
    };

    Ok(DataSet {
        version: header.version,
        text: kws,
        parameter_count: md.par,
        event_count,
        channels: md.parameters,
        events,
        analysis,
        next_data_offset,
        delimiter,
        warnings,
    })
}

/// `take(..).read_to_end(..)` stops quietly at EOF, so a short segment
/// has to be caught by comparing lengths.
fn check_segment_len(
    buf: &[u8],
    seg: Segment,
    id: SegmentId,
    base: u64,
    file_size: u64,
) -> Result<(), FcsError> {
    if (buf.len() as u64) < seg.nbytes() {
        let end = seg.bounds().map(|(_, e)| e).unwrap_or(0);
        return Err(FcsError::TruncatedData {
            id,
            needed: base + end + 1,
            available: file_size,
        });
    }
    Ok(())
}
