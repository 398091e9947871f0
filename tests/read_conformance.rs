//! Reader conformance against hand-assembled files, including the
//! non-conforming shapes that ship from real instruments.

use fcsio::{
    read, BitWidth, EventData, FcsError, KeyString, ReadConfig, SegmentId, Version, Warning,
};
use std::io::Cursor;

const DELIM: u8 = b'/';

/// Assemble a single-data-set file from keyword pairs and raw DATA bytes.
///
/// TEXT goes right after the HEADER; DATA (and optionally ANALYSIS)
/// follow TEXT. Offset keywords that depend on the layout can be supplied
/// through `extra` as pre-formatted 8-digit values computed by the test;
/// everything here is fixed-width so positions never shift.
struct FileBuilder {
    version: &'static str,
    pairs: Vec<(String, String)>,
    data: Vec<u8>,
    analysis: Vec<(String, String)>,
    header_data_override: Option<(u64, u64)>,
}

impl FileBuilder {
    fn new(version: &'static str) -> FileBuilder {
        FileBuilder {
            version,
            pairs: Vec::new(),
            data: Vec::new(),
            analysis: Vec::new(),
            header_data_override: None,
        }
    }

    fn pair(mut self, k: &str, v: &str) -> FileBuilder {
        self.pairs.push((k.to_string(), v.to_string()));
        self
    }

    fn data(mut self, d: &[u8]) -> FileBuilder {
        self.data = d.to_vec();
        self
    }

    fn analysis_pair(mut self, k: &str, v: &str) -> FileBuilder {
        self.analysis.push((k.to_string(), v.to_string()));
        self
    }

    fn header_data(mut self, begin: u64, end: u64) -> FileBuilder {
        self.header_data_override = Some((begin, end));
        self
    }

    fn text_bytes(&self) -> Vec<u8> {
        let mut t = vec![DELIM];
        for (k, v) in &self.pairs {
            t.extend_from_slice(k.as_bytes());
            t.push(DELIM);
            t.extend_from_slice(v.as_bytes());
            t.push(DELIM);
        }
        t
    }

    fn build(self) -> Vec<u8> {
        let text = self.text_bytes();
        let text_begin = 58u64;
        let text_end = text_begin + text.len() as u64 - 1;
        let data_begin = text_end + 1;
        let data_end = if self.data.is_empty() {
            0
        } else {
            data_begin + self.data.len() as u64 - 1
        };
        let (hd_begin, hd_end) = self.header_data_override.unwrap_or((
            if self.data.is_empty() { 0 } else { data_begin },
            data_end,
        ));

        let mut abytes = Vec::new();
        if !self.analysis.is_empty() {
            abytes.push(DELIM);
            for (k, v) in &self.analysis {
                abytes.extend_from_slice(k.as_bytes());
                abytes.push(DELIM);
                abytes.extend_from_slice(v.as_bytes());
                abytes.push(DELIM);
            }
        }
        let analysis_begin = data_begin + self.data.len() as u64;
        let (ha_begin, ha_end) = if abytes.is_empty() {
            (0, 0)
        } else {
            (analysis_begin, analysis_begin + abytes.len() as u64 - 1)
        };

        let mut out = Vec::new();
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(b"    ");
        for x in [text_begin, text_end, hd_begin, hd_end, ha_begin, ha_end] {
            out.extend_from_slice(format!("{x:>8}").as_bytes());
        }
        assert_eq!(out.len(), 58);
        out.extend_from_slice(&text);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&abytes);
        out
    }
}

fn base_int16(version: &'static str) -> FileBuilder {
    FileBuilder::new(version)
        .pair("$MODE", "L")
        .pair("$DATATYPE", "I")
        .pair("$BYTEORD", "1,2,3,4")
        .pair("$PAR", "1")
        .pair("$P1B", "16")
        .pair("$P1R", "1024")
        .pair("$P1N", "FSC-A")
}

fn get<'a>(ds: &'a fcsio::DataSet, k: &str) -> Option<&'a str> {
    ds.text.get(&KeyString::new(k)).map(|s| s.as_str())
}

#[test]
fn int_masking_applies_range() {
    // stored 0xFFFF with $P1R=1024 must decode to 1023
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "2")
        .data(&[0xff, 0xff, 0x2a, 0x00])
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![1023, 42]));
}

#[test]
fn big_endian_int_decodes() {
    let buf = FileBuilder::new("FCS3.0")
        .pair("$MODE", "L")
        .pair("$DATATYPE", "I")
        .pair("$BYTEORD", "4,3,2,1")
        .pair("$PAR", "1")
        .pair("$TOT", "1")
        .pair("$P1B", "32")
        .pair("$P1R", "4294967296")
        .pair("$P1N", "FSC-A")
        .data(&[0x00, 0x00, 0x00, 0x2a])
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![42]));
}

#[test]
fn zero_header_offsets_use_text_keywords() {
    // HEADER says 0/0 for DATA; TEXT carries the real offsets
    let pre = base_int16("FCS3.1").pair("$TOT", "1");
    let text_len = pre.text_bytes().len() as u64
        + "$BEGINDATA//$ENDDATA//".len() as u64
        + 16;
    let data_begin = 58 + text_len;
    let data_end = data_begin + 1;
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .pair("$BEGINDATA", &format!("{data_begin:>8}"))
        .pair("$ENDDATA", &format!("{data_end:>8}"))
        .header_data(0, 0)
        .data(&[0x07, 0x00])
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![7]));
    assert!(ds.warnings.is_empty());
}

#[test]
fn text_offsets_win_over_header_with_warning() {
    // HEADER points two bytes early; TEXT has it right
    let pre = base_int16("FCS3.1").pair("$TOT", "1");
    let text_len = pre.text_bytes().len() as u64
        + "$BEGINDATA//$ENDDATA//".len() as u64
        + 16;
    let data_begin = 58 + text_len;
    let data_end = data_begin + 1;
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .pair("$BEGINDATA", &format!("{data_begin:>8}"))
        .pair("$ENDDATA", &format!("{data_end:>8}"))
        .header_data(data_begin - 2, data_end - 2)
        .data(&[0x2a, 0x00])
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![42]));
    assert!(ds
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::OffsetMismatch { id: SegmentId::Data, .. })));
}

#[test]
fn header_offsets_forced_by_config() {
    // TEXT points at the true data; the HEADER declares a segment of the
    // wrong length. Forcing the HEADER must surface the bad layout that
    // the default (TEXT-first) rule would paper over.
    let pre = base_int16("FCS3.1").pair("$TOT", "1");
    let text_len = pre.text_bytes().len() as u64
        + "$BEGINDATA//$ENDDATA//".len() as u64
        + 16;
    let data_begin = 58 + text_len;
    let data_end = data_begin + 1;
    let mut buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .pair("$BEGINDATA", &format!("{data_begin:>8}"))
        .pair("$ENDDATA", &format!("{data_end:>8}"))
        .header_data(data_begin, data_end + 3)
        .data(&[0x2a, 0x00])
        .build();
    buf.extend_from_slice(b"junk");

    let ds = read(Cursor::new(buf.clone()), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![42]));

    let conf = ReadConfig {
        use_header_offsets: true,
        ..ReadConfig::default()
    };
    let res = read(Cursor::new(buf), &conf);
    assert!(matches!(res, Err(FcsError::InconsistentOffsets { .. })));
}

#[test]
fn mode_correlated_rejected() {
    let mut b = base_int16("FCS3.1");
    b.pairs[0] = ("$MODE".to_string(), "C".to_string());
    let buf = b.pair("$TOT", "0").build();
    let res = read(Cursor::new(buf), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::UnsupportedMode(_))));
}

#[test]
fn unknown_datatype_rejected() {
    let mut b = base_int16("FCS3.1");
    b.pairs[1] = ("$DATATYPE".to_string(), "X".to_string());
    let buf = b.pair("$TOT", "0").build();
    let res = read(Cursor::new(buf), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::UnsupportedDataType(v)) if v == "X"));
}

#[test]
fn missing_tot_rejected_in_31() {
    let buf = base_int16("FCS3.1").data(&[0, 0]).build();
    let res = read(Cursor::new(buf), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::MissingRequiredKeyword(k)) if k.as_str() == "$tot"));
}

#[test]
fn missing_tot_derived_in_20() {
    let buf = base_int16("FCS2.0")
        .data(&[1, 0, 2, 0, 3, 0])
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.event_count, 3);
    assert_eq!(ds.events, EventData::Uint(vec![1, 2, 3]));
}

#[test]
fn truncated_data_detected() {
    let mut buf = base_int16("FCS3.1")
        .pair("$TOT", "2")
        .data(&[1, 0, 2, 0])
        .build();
    buf.truncate(buf.len() - 3);
    let res = read(Cursor::new(buf), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::TruncatedData { .. })));
}

#[test]
fn exclusive_end_offset_needs_opt_in() {
    // DATA segment one byte longer than $PAR x $TOT x width
    let pre = base_int16("FCS3.1").pair("$TOT", "1");
    let text_len = pre.text_bytes().len() as u64;
    let data_begin = 58 + text_len;
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .header_data(data_begin, data_begin + 2)
        .data(&[0x07, 0x00, 0xee])
        .build();

    let res = read(Cursor::new(buf.clone()), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::InconsistentOffsets { .. })));

    let conf = ReadConfig {
        allow_data_slack: true,
        ..ReadConfig::default()
    };
    let ds = read(Cursor::new(buf), &conf).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![7]));
    assert!(ds.warnings.contains(&Warning::DataEndSlack));
}

#[test]
fn duplicate_keywords_warn_and_last_wins() {
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "0")
        .pair("$FIL", "first.fcs")
        .pair("$FIL", "second.fcs")
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(get(&ds, "$fil"), Some("second.fcs"));
    assert!(ds
        .warnings
        .contains(&Warning::DuplicateKey(KeyString::new("$fil"))));
}

#[test]
fn analysis_segment_parsed() {
    let buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .data(&[5, 0])
        .analysis_pair("GATING", "none")
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(
        ds.analysis.get(&KeyString::new("gating")).map(|s| s.as_str()),
        Some("none")
    );
}

#[test]
fn absent_analysis_is_empty() {
    let buf = base_int16("FCS3.1").pair("$TOT", "0").build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert!(ds.analysis.is_empty());
}

#[test]
fn supplemental_text_merged() {
    // STEXT appended after DATA carrying a keyword primary TEXT lacks
    let pre = base_int16("FCS3.1").pair("$TOT", "1");
    let stext = b"/$CYT/Imaginary 9000/";
    let text_len = pre.text_bytes().len() as u64
        + "$BEGINSTEXT//$ENDSTEXT//".len() as u64
        + 16;
    let data_begin = 58 + text_len;
    let stext_begin = data_begin + 2;
    let stext_end = stext_begin + stext.len() as u64 - 1;
    let mut buf = base_int16("FCS3.1")
        .pair("$TOT", "1")
        .pair("$BEGINSTEXT", &format!("{stext_begin:>8}"))
        .pair("$ENDSTEXT", &format!("{stext_end:>8}"))
        .data(&[9, 0])
        .build();
    buf.extend_from_slice(stext);

    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(get(&ds, "$cyt"), Some("Imaginary 9000"));
    assert_eq!(ds.events, EventData::Uint(vec![9]));
}

#[test]
fn fixed_width_ascii_data() {
    let buf = FileBuilder::new("FCS3.0")
        .pair("$MODE", "L")
        .pair("$DATATYPE", "A")
        .pair("$BYTEORD", "1,2,3,4")
        .pair("$PAR", "2")
        .pair("$TOT", "2")
        .pair("$P1B", "3")
        .pair("$P1R", "1000")
        .pair("$P1N", "FSC-A")
        .pair("$P2B", "2")
        .pair("$P2R", "100")
        .pair("$P2N", "SSC-A")
        .data(b"0074210699")
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![7, 42, 106, 99]));
    assert_eq!(ds.channels[0].bit_width, BitWidth::Fixed(3));
}

#[test]
fn delimited_ascii_data() {
    let buf = FileBuilder::new("FCS3.0")
        .pair("$MODE", "L")
        .pair("$DATATYPE", "A")
        .pair("$BYTEORD", "1,2,3,4")
        .pair("$PAR", "2")
        .pair("$TOT", "2")
        .pair("$P1B", "*")
        .pair("$P1R", "1000")
        .pair("$P1N", "FSC-A")
        .pair("$P2B", "*")
        .pair("$P2R", "1000")
        .pair("$P2N", "SSC-A")
        .data(b"1 22,333\r\n4444")
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.events, EventData::Uint(vec![1, 22, 333, 4444]));
    assert_eq!(ds.channels[0].bit_width, BitWidth::Variable);
}

#[test]
fn float_20_with_tot_absent() {
    let mut data = Vec::new();
    for x in [1.5f32, 2.5, 3.5, 4.5] {
        data.extend_from_slice(&x.to_le_bytes());
    }
    let buf = FileBuilder::new("FCS2.0")
        .pair("$MODE", "L")
        .pair("$DATATYPE", "F")
        .pair("$BYTEORD", "1,2,3,4")
        .pair("$PAR", "2")
        .pair("$P1B", "32")
        .pair("$P1R", "1024")
        .pair("$P1N", "FSC-A")
        .pair("$P2B", "32")
        .pair("$P2R", "1024")
        .pair("$P2N", "SSC-A")
        .data(&data)
        .build();
    let ds = read(Cursor::new(buf), &ReadConfig::default()).unwrap();
    assert_eq!(ds.version, Version::FCS2_0);
    assert_eq!(ds.event_count, 2);
    assert_eq!(ds.events, EventData::Single(vec![1.5, 2.5, 3.5, 4.5]));
}

#[test]
fn bad_magic_rejected() {
    let mut buf = base_int16("FCS3.1").pair("$TOT", "0").build();
    buf[0..6].copy_from_slice(b"LMD1.0");
    let res = read(Cursor::new(buf), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::MalformedHeader(_))));
}

#[test]
fn short_file_rejected() {
    let res = read(Cursor::new(b"FCS3.1  ".to_vec()), &ReadConfig::default());
    assert!(matches!(res, Err(FcsError::MalformedHeader(_))));
}
