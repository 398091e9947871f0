//! Reader and writer for Flow Cytometry Standard (FCS) files.
//!
//! FCS is a single-file binary container for cytometry measurement data.
//! Each data set in a file pairs a delimited keyword/value TEXT segment with
//! a dense numeric DATA segment holding one row per measured event and one
//! column per parameter (channel). Versions 2.0, 3.0, and 3.1 are supported.
//!
//! The crate exposes raw events and raw metadata only; compensation,
//! transformation, gating, and other downstream interpretation belong to
//! other libraries.
//!
//! # Reading
//!
//! ```no_run
//! use fcsio::{read_fcs_file, ReadConfig};
//!
//! let ds = read_fcs_file("experiment.fcs", &ReadConfig::default()).unwrap();
//! println!("{} events x {} channels", ds.event_count, ds.parameter_count);
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use fcsio::{write_fcs_file, ChannelSpec, EventData, WriteConfig, WriterSpec};
//! use nonempty::nonempty;
//!
//! let spec = WriterSpec::float(nonempty![
//!     ChannelSpec::float("FSC-A".parse().unwrap()),
//!     ChannelSpec::float("SSC-A".parse().unwrap()),
//! ]);
//! let events = EventData::Single(vec![1.0, 2.0, 3.0, 4.0]);
//! write_fcs_file("out.fcs", &events, &spec, &WriteConfig::default()).unwrap();
//! ```

#![warn(clippy::shadow_reuse)]
#![warn(clippy::shadow_unrelated)]

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod header;
pub mod keywords;
pub mod metadata;
mod numeric;
pub mod segment;
pub mod text;
pub mod writer;

pub use config::{ReadConfig, TextDelim, WriteConfig};
pub use data::EventData;
pub use dataset::{
    read, read_fcs_data_sets, read_fcs_file, read_fcs_text, read_multiple, DataSet, DataSetIter,
    TextData,
};
pub use error::{FcsError, Warning};
pub use header::{Header, Version};
pub use keywords::{AlphaNumType, BitWidth, ByteOrd, Endian, Gain, Mode, Range, Scale, Shortname};
pub use metadata::{Metadata, Parameter};
pub use segment::{Segment, SegmentId};
pub use text::{KeyString, RawKeywords};
pub use writer::{write, write_fcs_file, ChannelSpec, WriterSpec};
