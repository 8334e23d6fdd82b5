//! Builders for content files on disk.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::{json, Value};

use recforge::codec::{Header, RecordKind, RecordWriter};

struct PendingRecord {
    kind: RecordKind,
    id: String,
    body: Value,
    deleted: bool,
}

/// Builder for content and project files.
pub struct ContentFileBuilder {
    author: String,
    project: bool,
    records: Vec<PendingRecord>,
}

impl ContentFileBuilder {
    pub fn new() -> Self {
        Self {
            author: "tester".to_string(),
            project: false,
            records: Vec::new(),
        }
    }

    pub fn project(mut self) -> Self {
        self.project = true;
        self
    }

    pub fn record(mut self, kind: RecordKind, id: &str, body: Value) -> Self {
        self.records.push(PendingRecord {
            kind,
            id: id.to_string(),
            body,
            deleted: false,
        });
        self
    }

    pub fn deleted(mut self, kind: RecordKind, id: &str) -> Self {
        self.records.push(PendingRecord {
            kind,
            id: id.to_string(),
            body: json!({}),
            deleted: true,
        });
        self
    }

    /// A generic record with a single `value` field.
    pub fn global(self, id: &str, value: &str) -> Self {
        self.record(RecordKind::Global, id, json!({ "fields": { "value": value } }))
    }

    pub fn spell(self, id: &str, cost: &str) -> Self {
        self.record(RecordKind::Spell, id, json!({ "fields": { "cost": cost } }))
    }

    pub fn referenceable(self, id: &str) -> Self {
        self.record(RecordKind::Referenceable, id, json!({}))
    }

    pub fn cell(self, id: &str, ref_num_counter: u32) -> Self {
        self.record(
            RecordKind::Cell,
            id,
            json!({ "name": id, "refNumCounter": ref_num_counter }),
        )
    }

    pub fn reference(self, id: &str, cell: &str, object: &str, ref_num: u32) -> Self {
        self.record(
            RecordKind::CellRef,
            id,
            json!({ "cell": cell, "object": object, "refNum": ref_num }),
        )
    }

    pub fn topic(self, id: &str) -> Self {
        self.record(RecordKind::Dialogue, id, json!({ "kind": "topic" }))
    }

    pub fn info(self, id: &str, topic: &str, text: &str) -> Self {
        self.record(RecordKind::Info, id, json!({ "topic": topic, "text": text }))
    }

    pub fn land_texture(self, id: &str, texture: &str) -> Self {
        self.record(RecordKind::LandTexture, id, json!({ "texture": texture }))
    }

    pub fn land(self, x: i32, y: i32, textures: &[&str]) -> Self {
        self.record(
            RecordKind::Land,
            &format!("#{} {}", x, y),
            json!({ "x": x, "y": y, "textures": textures }),
        )
    }

    pub fn write(&self, path: &Path) {
        let file = File::create(path).expect("Failed to create content file");
        let mut writer = RecordWriter::new(BufWriter::new(file));
        writer
            .write_header(&Header::new(&self.author, "", self.records.len(), self.project))
            .expect("Failed to write header");
        for record in &self.records {
            writer
                .start_record(record.kind, &record.id)
                .expect("Failed to start record");
            if record.deleted {
                writer.mark_deleted().expect("Failed to mark deleted");
            } else {
                writer.write_body(&record.body).expect("Failed to write body");
            }
            writer.end_record().expect("Failed to end record");
        }
        writer.close().expect("Failed to close content file");
    }
}

impl Default for ContentFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
