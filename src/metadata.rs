//! Resolution of raw TEXT keywords into a typed picture of one data set.
//!
//! The resolver decides which offsets to trust (HEADER vs TEXT), pulls the
//! required keywords for decoding DATA, and collects the per-channel
//! records. Unknown keywords are left untouched in the raw map.

use crate::config::ReadConfig;
use crate::error::{FcsError, Warning};
use crate::header::{Header, Version};
use crate::keywords::{
    get_opt, get_raw, get_req, keys, AlphaNumType, BitWidth, ByteOrd, Gain, Mode, Range, Scale,
    ScaleError, Shortname,
};
use crate::segment::{Segment, SegmentId};
use crate::text::RawKeywords;

use serde::Serialize;

/// One channel (parameter) of a data set, assembled from the `$PnX`
/// keywords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    /// 1-based index, matching the `n` of the `$PnX` keywords.
    pub index: usize,
    /// `$PnB`: bits per value, or `*` for delimited ASCII.
    pub bit_width: BitWidth,
    /// `$PnR`: the logical range of the channel.
    pub range: Range,
    /// `$PnN`: short name.
    pub short_name: Shortname,
    /// `$PnS`: long name, if given.
    pub long_name: Option<String>,
    /// `$PnE`: amplification; linear when absent.
    pub scale: Scale,
    /// `$PnG`: amplifier gain, if given (3.0+).
    pub gain: Option<Gain>,
}

/// The typed picture of one data set's metadata, sufficient to decode its
/// DATA segment.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub version: Version,
    /// `$PAR`.
    pub par: usize,
    /// `$TOT`; may be absent in 2.0, in which case the decoder derives it
    /// from the DATA segment length.
    pub tot: Option<usize>,
    pub datatype: AlphaNumType,
    pub byteord: ByteOrd,
    pub parameters: Vec<Parameter>,
    /// Resolved DATA segment (TEXT wins over HEADER per the rules below).
    pub data: Segment,
    /// Resolved ANALYSIS segment.
    pub analysis: Segment,
    /// `$NEXTDATA`, relative to this data set's HEADER; 0 when last.
    pub nextdata: u64,
}

/// Resolve raw keywords (primary + supplemental TEXT already merged)
/// against the HEADER into a [`Metadata`].
pub(crate) fn resolve_metadata(
    header: &Header,
    kws: &RawKeywords,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Result<Metadata, FcsError> {
    let version = header.version;

    let mode: Mode = get_req(kws, keys::MODE)?;
    if mode != Mode::List {
        return Err(FcsError::UnsupportedMode(mode));
    }

    let datatype = match get_raw(kws, keys::DATATYPE) {
        None => {
            return Err(FcsError::MissingRequiredKeyword(
                crate::text::KeyString::new(keys::DATATYPE),
            ))
        }
        Some(v) => v
            .parse::<AlphaNumType>()
            .map_err(|_| FcsError::UnsupportedDataType(v.to_string()))?,
    };

    let byteord = resolve_byteord(version, datatype, kws)?;

    let par: usize = get_req(kws, keys::PAR)?;
    if par == 0 {
        return Err(FcsError::InvalidKeyword {
            key: crate::text::KeyString::new(keys::PAR),
            value: "0".to_string(),
            msg: "parameter count must be positive".to_string(),
        });
    }
    let tot = match version {
        // $TOT was optional in 2.0
        Version::FCS2_0 => get_opt(kws, keys::TOT, warnings),
        _ => Some(get_req(kws, keys::TOT)?),
    };

    let parameters = (1..=par)
        .map(|i| resolve_parameter(i, kws, warnings))
        .collect::<Result<Vec<_>, _>>()?;

    let data = resolve_data_segment(version, header, kws, conf, warnings);
    let analysis = resolve_analysis_segment(header, kws, warnings);
    let nextdata = get_opt(kws, keys::NEXTDATA, warnings).unwrap_or(0);

    Ok(Metadata {
        version,
        par,
        tot,
        datatype,
        byteord,
        parameters,
        data,
        analysis,
        nextdata,
    })
}

/// Parse `$BYTEORD`, applying the version/datatype restrictions.
///
/// 3.1 dropped mixed orders entirely; float and double data never had a
/// meaningful mixed order in any version.
fn resolve_byteord(
    version: Version,
    datatype: AlphaNumType,
    kws: &RawKeywords,
) -> Result<ByteOrd, FcsError> {
    let byteord: ByteOrd = get_req(kws, keys::BYTEORD)?;
    if let ByteOrd::Mixed(_) = byteord {
        if version == Version::FCS3_1 {
            return Err(FcsError::UnsupportedByteOrder(format!(
                "3.1 files must use 1,2,3,4 or 4,3,2,1; found {byteord}"
            )));
        }
        if matches!(datatype, AlphaNumType::Float | AlphaNumType::Double) {
            return Err(FcsError::UnsupportedByteOrder(format!(
                "{byteord} cannot apply to $DATATYPE={datatype}"
            )));
        }
    }
    Ok(byteord)
}

fn resolve_parameter(
    i: usize,
    kws: &RawKeywords,
    warnings: &mut Vec<Warning>,
) -> Result<Parameter, FcsError> {
    let bit_width: BitWidth = get_req(kws, &keys::pn(i, 'b'))?;
    let range: Range = get_req(kws, &keys::pn(i, 'r'))?;
    let short_name = match get_raw(kws, &keys::pn(i, 'n')) {
        Some(v) => Shortname::new_unchecked(v),
        None => {
            return Err(FcsError::MissingRequiredKeyword(
                crate::text::KeyString::new(&keys::pn(i, 'n')),
            ))
        }
    };
    let long_name = get_raw(kws, &keys::pn(i, 's')).map(|s| s.to_string());
    let scale = resolve_scale(i, kws, warnings);
    let gain = get_opt(kws, &keys::pn(i, 'g'), warnings);
    Ok(Parameter {
        index: i,
        bit_width,
        range,
        short_name,
        long_name,
        scale,
        gain,
    })
}

/// Resolve `$PnE`, defaulting to linear and applying the standard's repair
/// for log scales that declare a zero offset.
fn resolve_scale(i: usize, kws: &RawKeywords, warnings: &mut Vec<Warning>) -> Scale {
    let key = keys::pn(i, 'e');
    let Some(v) = get_raw(kws, &key) else {
        return Scale::Linear;
    };
    match v.parse::<Scale>() {
        Ok(s) => s,
        Err(ScaleError::ZeroOffset { decades }) => {
            warnings.push(Warning::LogScaleOffsetRepaired { index: i });
            Scale::Log {
                decades,
                offset: 1.0,
            }
        }
        Err(_) => {
            warnings.push(Warning::BadOptionalValue {
                key: crate::text::KeyString::new(&key),
                value: v.to_string(),
            });
            Scale::Linear
        }
    }
}

/// Pick the DATA segment offsets.
///
/// 2.0 has no offset keywords, so the HEADER is authoritative. For 3.0/3.1
/// the TEXT values win when both are present and disagree (with a warning),
/// unless the caller forces the HEADER. HEADER values of 0 simply mean the
/// segment did not fit in the 8-digit fields.
fn resolve_data_segment(
    version: Version,
    header: &Header,
    kws: &RawKeywords,
    conf: &ReadConfig,
    warnings: &mut Vec<Warning>,
) -> Segment {
    if version == Version::FCS2_0 || conf.use_header_offsets {
        return header.data;
    }
    let begin: Option<u64> = get_opt(kws, keys::BEGINDATA, warnings);
    let end: Option<u64> = get_opt(kws, keys::ENDDATA, warnings);
    match (begin, end) {
        (Some(b), Some(e)) => {
            let text_seg = Segment::new(b, e);
            if let (Some(hdr), Some(txt)) = (header.data.bounds(), text_seg.bounds()) {
                if hdr != txt {
                    warnings.push(Warning::OffsetMismatch {
                        id: SegmentId::Data,
                        header: hdr,
                        text: txt,
                    });
                }
            }
            text_seg
        }
        // 3.0+ requires these keywords, but a HEADER with real offsets is
        // still usable when they are missing
        _ => header.data,
    }
}

/// Pick the ANALYSIS segment offsets, each bound falling back to the
/// HEADER independently.
fn resolve_analysis_segment(
    header: &Header,
    kws: &RawKeywords,
    warnings: &mut Vec<Warning>,
) -> Segment {
    let (hb, he) = header.analysis.bounds().unwrap_or((0, 0));
    let begin = get_opt(kws, keys::BEGINANALYSIS, warnings).unwrap_or(hb);
    let end = get_opt(kws, keys::ENDANALYSIS, warnings).unwrap_or(he);
    Segment::new(begin, end)
}

/// The supplemental TEXT segment, if TEXT declares one distinct from the
/// primary segment.
pub(crate) fn supplemental_text_segment(
    header: &Header,
    kws: &RawKeywords,
    warnings: &mut Vec<Warning>,
) -> Segment {
    let begin: Option<u64> = get_opt(kws, keys::BEGINSTEXT, warnings);
    let end: Option<u64> = get_opt(kws, keys::ENDSTEXT, warnings);
    match (begin, end) {
        (Some(b), Some(e)) => {
            let seg = Segment::new(b, e);
            if seg == header.text {
                // some files point STEXT back at primary TEXT; nothing new
                // to read there
                Segment::Empty
            } else {
                seg
            }
        }
        _ => Segment::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::Endian;
    use crate::text::KeyString;

    fn kws(pairs: &[(&str, &str)]) -> RawKeywords {
        pairs
            .iter()
            .map(|(k, v)| (KeyString::new(k), v.to_string()))
            .collect()
    }

    fn header31() -> Header {
        Header {
            version: Version::FCS3_1,
            text: Segment::new(58, 1023),
            data: Segment::new(1024, 2047),
            analysis: Segment::Empty,
        }
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("$MODE", "L"),
            ("$DATATYPE", "F"),
            ("$BYTEORD", "1,2,3,4"),
            ("$PAR", "1"),
            ("$TOT", "10"),
            ("$P1B", "32"),
            ("$P1R", "1024"),
            ("$P1N", "FSC-A"),
        ]
    }

    #[test]
    fn test_resolve_minimal() {
        let mut w = Vec::new();
        let md =
            resolve_metadata(&header31(), &kws(&minimal()), &ReadConfig::default(), &mut w)
                .unwrap();
        assert_eq!(md.par, 1);
        assert_eq!(md.tot, Some(10));
        assert_eq!(md.datatype, AlphaNumType::Float);
        assert_eq!(md.byteord, ByteOrd::Endian(Endian::Little));
        assert_eq!(md.data, Segment::new(1024, 2047));
        assert_eq!(md.nextdata, 0);
        assert_eq!(md.parameters[0].scale, Scale::Linear);
        assert!(w.is_empty());
    }

    #[test]
    fn test_missing_tot_31() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "$TOT");
        let mut w = Vec::new();
        let res = resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w);
        assert!(matches!(res, Err(FcsError::MissingRequiredKeyword(_))));
    }

    #[test]
    fn test_missing_tot_20_allowed() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "$TOT");
        let header = Header {
            version: Version::FCS2_0,
            ..header31()
        };
        let mut w = Vec::new();
        let md = resolve_metadata(&header, &kws(&pairs), &ReadConfig::default(), &mut w).unwrap();
        assert_eq!(md.tot, None);
    }

    #[test]
    fn test_correlated_mode_rejected() {
        let mut pairs = minimal();
        pairs[0] = ("$MODE", "C");
        let mut w = Vec::new();
        let res = resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w);
        assert!(matches!(res, Err(FcsError::UnsupportedMode(Mode::Correlated))));
    }

    #[test]
    fn test_unknown_datatype_rejected() {
        let mut pairs = minimal();
        pairs[1] = ("$DATATYPE", "Z");
        let mut w = Vec::new();
        let res = resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w);
        assert!(matches!(res, Err(FcsError::UnsupportedDataType(v)) if v == "Z"));
    }

    #[test]
    fn test_mixed_byteord_rejected_in_31() {
        let mut pairs = minimal();
        pairs[1] = ("$DATATYPE", "I");
        pairs[2] = ("$BYTEORD", "3,4,1,2");
        let mut w = Vec::new();
        let res = resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w);
        assert!(matches!(res, Err(FcsError::UnsupportedByteOrder(_))));
    }

    #[test]
    fn test_mixed_byteord_allowed_in_30_int() {
        let mut pairs = minimal();
        pairs[1] = ("$DATATYPE", "I");
        pairs[2] = ("$BYTEORD", "3,4,1,2");
        let header = Header {
            version: Version::FCS3_0,
            ..header31()
        };
        let mut w = Vec::new();
        let md = resolve_metadata(&header, &kws(&pairs), &ReadConfig::default(), &mut w).unwrap();
        assert_eq!(md.byteord, ByteOrd::Mixed(vec![2, 3, 0, 1]));
    }

    #[test]
    fn test_text_data_offsets_win_with_warning() {
        let mut pairs = minimal();
        pairs.push(("$BEGINDATA", "2000"));
        pairs.push(("$ENDDATA", "2999"));
        let mut w = Vec::new();
        let md =
            resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w).unwrap();
        assert_eq!(md.data, Segment::new(2000, 2999));
        assert!(matches!(w[..], [Warning::OffsetMismatch { .. }]));
    }

    #[test]
    fn test_header_data_offsets_forced() {
        let mut pairs = minimal();
        pairs.push(("$BEGINDATA", "2000"));
        pairs.push(("$ENDDATA", "2999"));
        let conf = ReadConfig {
            use_header_offsets: true,
            ..ReadConfig::default()
        };
        let mut w = Vec::new();
        let md = resolve_metadata(&header31(), &kws(&pairs), &conf, &mut w).unwrap();
        assert_eq!(md.data, Segment::new(1024, 2047));
        assert!(w.is_empty());
    }

    #[test]
    fn test_zero_header_with_text_offsets() {
        let mut pairs = minimal();
        pairs.push(("$BEGINDATA", "100000123"));
        pairs.push(("$ENDDATA", "100040122"));
        let header = Header {
            data: Segment::Empty,
            ..header31()
        };
        let mut w = Vec::new();
        let md = resolve_metadata(&header, &kws(&pairs), &ReadConfig::default(), &mut w).unwrap();
        assert_eq!(md.data, Segment::new(100_000_123, 100_040_122));
        assert!(w.is_empty());
    }

    #[test]
    fn test_scale_repair() {
        let mut pairs = minimal();
        pairs.push(("$P1E", "4,0"));
        let mut w = Vec::new();
        let md =
            resolve_metadata(&header31(), &kws(&pairs), &ReadConfig::default(), &mut w).unwrap();
        assert_eq!(
            md.parameters[0].scale,
            Scale::Log {
                decades: 4.0,
                offset: 1.0
            }
        );
        assert_eq!(w, vec![Warning::LogScaleOffsetRepaired { index: 1 }]);
    }
}
