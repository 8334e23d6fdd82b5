//! N-way merge of documents into a new one.

pub mod land;
pub mod operation;
pub mod stages;
pub mod state;

pub use land::{PopulateLandTexturesStage, PurgeLandTexturesStage};
pub use operation::MergeOperation;
pub use stages::{FinishMergedDocumentStage, MergeCollectionStage, MergeReferencesStage};
pub use state::MergeState;
