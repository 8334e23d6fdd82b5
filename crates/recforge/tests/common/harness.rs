//! Test harness for isolated test execution.
//!
//! The `TestHarness` owns a temporary directory for content and project files
//! and runs the loader and operations synchronously so tests can inspect
//! every event they produced.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::broadcast;

use recforge::codec::{Header, RawRecord, RecordReader};
use recforge::document::{read_document, Document, SharedDocument};
use recforge::loader::{Loader, LoaderBroadcaster, LoaderEvent};
use recforge::operation::{ChannelReporter, Operation, OperationEvent};
use recforge::saving::saving_operation;
use recforge::Message;

use super::builders::ContentFileBuilder;

/// Outcome of running an operation to completion.
pub struct OperationRun<C> {
    pub operation: Operation<C>,
    pub events: Vec<OperationEvent>,
}

impl<C> OperationRun<C> {
    pub fn messages(&self) -> Vec<Message> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OperationEvent::Message { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        !self.operation.has_error()
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `builder` to `name` and returns its path.
    pub fn write(&self, name: &str, builder: ContentFileBuilder) -> PathBuf {
        let path = self.path(name);
        builder.write(&path);
        path
    }

    /// A document editing the last of `files`, with `<last>.project` as its
    /// project file.
    pub fn document(&self, files: &[&str], is_new: bool) -> SharedDocument {
        let content_files: Vec<PathBuf> = files.iter().map(|f| self.path(f)).collect();
        let project = files
            .last()
            .map(|f| self.path(&format!("{}.project", f)))
            .unwrap_or_default();
        let mut document = Document::new(content_files, project, is_new);
        document.author = "harness".to_string();
        document.into_shared()
    }

    /// Loads `document` on the calling thread and returns its loader events.
    pub fn load(&self, document: &SharedDocument) -> Vec<LoaderEvent> {
        let loader = Loader::new(LoaderBroadcaster::new(4096));
        let mut events = loader.events().subscribe();
        loader
            .load_document(Arc::clone(document))
            .expect("Failed to queue document");
        while loader.load() {}
        drain(&mut events)
    }

    /// Loads `files` into a fresh document and panics if loading fails.
    pub fn open(&self, files: &[&str]) -> SharedDocument {
        let document = self.document(files, false);
        let events = self.load(&document);
        assert!(
            matches!(events.last(), Some(LoaderEvent::DocumentLoaded { .. })),
            "loading failed: {:?}",
            events.last()
        );
        document
    }

    pub fn save(&self, document: &SharedDocument) -> OperationRun<recforge::saving::SaveContext> {
        let operation = saving_operation(Arc::clone(document)).expect("Failed to create save");
        run(operation)
    }

    /// Reads a written file back as header and raw records.
    pub fn read_file(&self, path: &Path) -> (Header, Vec<RawRecord>) {
        let mut reader = RecordReader::open(path).expect("Failed to open file");
        let header = reader.header().clone();
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().expect("Failed to read record") {
            records.push(record);
        }
        (header, records)
    }

    pub fn is_clean(&self, document: &SharedDocument) -> bool {
        read_document(document).unwrap().is_clean()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `operation` on the calling thread, capturing its events.
pub fn run<C>(mut operation: Operation<C>) -> OperationRun<C> {
    let (tx, rx) = crossbeam_channel::unbounded();
    operation.add_reporter(Box::new(ChannelReporter::new(tx)));
    operation.run_to_completion();
    OperationRun {
        operation,
        events: rx.try_iter().collect(),
    }
}

pub fn drain(events: &mut broadcast::Receiver<LoaderEvent>) -> Vec<LoaderEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}
