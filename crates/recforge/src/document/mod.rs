//! In-memory document model shared by the loader and the pipelines.

pub mod collection;
pub mod data;
pub mod record;
pub mod types;

pub use collection::{Collection, Scope};
pub use data::Data;
pub use record::{Record, RecordState};
pub use types::{
    exterior_id, parse_exterior_id, Cell, CellRef, Dialogue, DialogueKind, GenericRecord, Info,
    Land, LandTexture,
};

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::error::DocumentError;

/// Stable identifier of a document for event routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub type SharedDocument = Arc<RwLock<Document>>;

pub struct Document {
    id: DocumentId,
    /// Dependencies in load order; the last entry is the file being edited.
    content_files: Vec<PathBuf>,
    project_path: PathBuf,
    /// The edited file does not exist on disk yet.
    is_new: bool,
    pub author: String,
    pub description: String,
    pub data: Data,
    clean: bool,
    saving: bool,
}

impl Document {
    pub fn new(content_files: Vec<PathBuf>, project_path: PathBuf, is_new: bool) -> Self {
        Self {
            id: DocumentId::new(),
            content_files,
            project_path,
            is_new,
            author: String::new(),
            description: String::new(),
            data: Data::new(),
            clean: true,
            saving: false,
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn content_files(&self) -> &[PathBuf] {
        &self.content_files
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// The file a save writes to.
    pub fn save_path(&self) -> Option<&Path> {
        self.content_files.last().map(|p| p.as_path())
    }

    /// Content files the saved file depends on.
    pub fn masters(&self) -> &[PathBuf] {
        match self.content_files.split_last() {
            Some((_, masters)) => masters,
            None => &[],
        }
    }

    /// Mutable access to the records; marks the document as having unsaved
    /// changes.
    pub fn edit(&mut self) -> &mut Data {
        self.clean = false;
        &mut self.data
    }

    pub fn is_clean(&self) -> bool {
        self.clean
    }

    pub fn mark_clean(&mut self) {
        self.clean = true;
        self.is_new = false;
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn set_saving(&mut self, saving: bool) {
        self.saving = saving;
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("content_files", &self.content_files)
            .field("project_path", &self.project_path)
            .field("is_new", &self.is_new)
            .field("clean", &self.clean)
            .field("saving", &self.saving)
            .finish()
    }
}

pub fn read_document(document: &SharedDocument) -> Result<RwLockReadGuard<'_, Document>, DocumentError> {
    document.read().map_err(|_| DocumentError::Poisoned)
}

pub fn write_document(
    document: &SharedDocument,
) -> Result<RwLockWriteGuard<'_, Document>, DocumentError> {
    document.write().map_err(|_| DocumentError::Poisoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_path_is_last_content_file() {
        let document = Document::new(
            vec![PathBuf::from("base.esm"), PathBuf::from("mod.esp")],
            PathBuf::from("mod.project"),
            true,
        );
        assert_eq!(document.save_path(), Some(Path::new("mod.esp")));
        assert_eq!(document.masters(), &[PathBuf::from("base.esm")]);
    }

    #[test]
    fn test_edit_marks_dirty_and_clean_resets() {
        let mut document = Document::new(vec![PathBuf::from("a")], PathBuf::from("p"), true);
        assert!(document.is_clean());
        document.edit().globals.modify("x", GenericRecord::new());
        assert!(!document.is_clean());
        document.mark_clean();
        assert!(document.is_clean());
        assert!(!document.is_new());
    }

    #[test]
    fn test_document_ids_are_unique() {
        let a = Document::new(vec![], PathBuf::new(), true);
        let b = Document::new(vec![], PathBuf::new(), true);
        assert_ne!(a.id(), b.id());
        assert!(a.masters().is_empty());
    }
}
