//! Line-oriented record codec.
//!
//! The pipelines only dictate write order and framing; this codec is the
//! concrete collaborator used to persist documents. Every line is one JSON
//! object: a header first, then one line per record.

pub mod header;
pub mod reader;
pub mod writer;

pub use header::{Header, Master, RecordKind, FORMAT_VERSION};
pub use reader::{RawRecord, RecordReader, SubRecord};
pub use writer::RecordWriter;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Line {
    Header(Header),
    Record(RawRecord),
}
