use std::io::Write;

use serde::Serialize;

use crate::error::CodecError;

use super::header::{Header, RecordKind};
use super::reader::{RawRecord, SubRecord};
use super::Line;

/// Writes a header followed by framed records.
///
/// Records are assembled between `start_record` and `end_record` and hit the
/// stream as one line when closed.
pub struct RecordWriter<W: Write> {
    out: W,
    header_written: bool,
    current: Option<RawRecord>,
    records_written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            current: None,
            records_written: 0,
        }
    }

    pub fn write_header(&mut self, header: &Header) -> Result<(), CodecError> {
        if self.header_written {
            return Err(CodecError::HeaderAlreadyWritten);
        }
        self.write_line(&Line::Header(header.clone()), "header")?;
        self.header_written = true;
        Ok(())
    }

    pub fn start_record(&mut self, kind: RecordKind, id: &str) -> Result<(), CodecError> {
        if !self.header_written {
            return Err(CodecError::MissingHeader);
        }
        if let Some(open) = &self.current {
            return Err(CodecError::RecordOpen(open.id.clone()));
        }
        self.current = Some(RawRecord {
            kind,
            id: id.to_string(),
            deleted: false,
            subs: Vec::new(),
            body: serde_json::Value::Null,
        });
        Ok(())
    }

    pub fn mark_deleted(&mut self) -> Result<(), CodecError> {
        let record = self.current.as_mut().ok_or(CodecError::NoRecordOpen)?;
        record.deleted = true;
        Ok(())
    }

    pub fn write_sub<T: Serialize>(&mut self, tag: &str, value: &T) -> Result<(), CodecError> {
        let record = self.current.as_mut().ok_or(CodecError::NoRecordOpen)?;
        let value = serde_json::to_value(value).map_err(|e| CodecError::Encode {
            id: record.id.clone(),
            source: e,
        })?;
        record.subs.push(SubRecord {
            tag: tag.to_string(),
            value,
        });
        Ok(())
    }

    pub fn write_body<T: Serialize>(&mut self, body: &T) -> Result<(), CodecError> {
        let record = self.current.as_mut().ok_or(CodecError::NoRecordOpen)?;
        record.body = serde_json::to_value(body).map_err(|e| CodecError::Encode {
            id: record.id.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn end_record(&mut self) -> Result<(), CodecError> {
        let record = self.current.take().ok_or(CodecError::NoRecordOpen)?;
        let id = record.id.clone();
        self.write_line(&Line::Record(record), &id)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flushes and returns the underlying stream. Fails if a record is open.
    pub fn close(mut self) -> Result<W, CodecError> {
        if let Some(open) = self.current.take() {
            return Err(CodecError::RecordOpen(open.id));
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_line(&mut self, line: &Line, id: &str) -> Result<(), CodecError> {
        serde_json::to_writer(&mut self.out, line).map_err(|e| CodecError::Encode {
            id: id.to_string(),
            source: e,
        })?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}
