//! Read-only scans over a loaded document: the verifier and text search.

pub mod search;
pub mod verifier;

use crate::document::SharedDocument;

pub use search::{search_operation, spawn_search, Search, SearchMode, SearchStage, Searchable};
pub use verifier::{
    spawn_verifier, verifier_operation, LandTextureCheckStage, MandatoryIdStage,
    ReferenceCheckStage, TopicInfoCheckStage,
};

/// Context shared by scan stages. Scans only take read locks.
pub struct ScanContext {
    pub document: SharedDocument,
}
