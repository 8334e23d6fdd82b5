use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

use super::header::{Header, RecordKind};
use super::Line;

/// Tagged auxiliary data attached to a record (e.g. `moved_from`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecord {
    pub tag: String,
    pub value: serde_json::Value,
}

/// One record as stored on disk; the body is decoded by the owning collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<SubRecord>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl RawRecord {
    pub fn sub(&self, tag: &str) -> Option<&serde_json::Value> {
        self.subs.iter().find(|s| s.tag == tag).map(|s| &s.value)
    }
}

/// Reads the header eagerly, then yields records one at a time.
pub struct RecordReader<R: BufRead> {
    input: R,
    header: Header,
    line: usize,
    buffer: String,
}

impl RecordReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CodecError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(mut input: R) -> Result<Self, CodecError> {
        let mut buffer = String::new();
        let mut line = 0;
        loop {
            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                return Err(CodecError::MissingHeader);
            }
            line += 1;
            if !buffer.trim().is_empty() {
                break;
            }
        }

        let header = match serde_json::from_str::<Line>(buffer.trim())
            .map_err(|e| CodecError::Malformed { line, source: e })?
        {
            Line::Header(header) => header,
            Line::Record(_) => return Err(CodecError::MissingHeader),
        };

        Ok(Self {
            input,
            header,
            line,
            buffer,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>, CodecError> {
        loop {
            self.buffer.clear();
            if self.input.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let text = self.buffer.trim();
            if text.is_empty() {
                continue;
            }
            return match serde_json::from_str::<Line>(text).map_err(|e| CodecError::Malformed {
                line: self.line,
                source: e,
            })? {
                Line::Record(record) => Ok(Some(record)),
                Line::Header(_) => Err(CodecError::UnexpectedHeader(self.line)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordWriter;
    use std::io::Cursor;

    fn encoded(records: &[(&str, bool)]) -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_header(&Header::new("a", "d", records.len(), false))
            .unwrap();
        for (id, deleted) in records {
            writer.start_record(RecordKind::Global, id).unwrap();
            if *deleted {
                writer.mark_deleted().unwrap();
            } else {
                writer.write_body(&serde_json::json!({ "value": 1 })).unwrap();
            }
            writer.end_record().unwrap();
        }
        writer.close().unwrap()
    }

    #[test]
    fn test_reads_header_and_records_in_order() {
        let bytes = encoded(&[("first", false), ("second", true)]);
        let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.header().record_count, 2);
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.id, "first");
        assert!(!first.deleted);
        let second = reader.next_record().unwrap().unwrap();
        assert!(second.deleted);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let result = RecordReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(result, Err(CodecError::MissingHeader)));
    }

    #[test]
    fn test_garbage_reports_line_number() {
        let mut bytes = encoded(&[("first", false)]);
        bytes.extend_from_slice(b"not json\n");
        let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();
        reader.next_record().unwrap();
        let err = reader.next_record().unwrap_err();
        assert!(matches!(err, CodecError::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_second_header_is_rejected() {
        let mut bytes = encoded(&[]);
        bytes.extend(encoded(&[]));
        let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(CodecError::UnexpectedHeader(2))
        ));
    }
}
