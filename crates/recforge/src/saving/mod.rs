//! Atomic save of a document into its project file and content file.

pub mod dialogue;
pub mod land;
pub mod operation;
pub mod references;
pub mod stages;
pub mod state;

pub use dialogue::WriteDialogueCollectionStage;
pub use land::WriteLandCollectionStage;
pub use operation::saving_operation;
pub use references::{
    CollectionReferencesStage, SortCollatedReferencesStage, WriteCellCollectionStage,
    MOVED_FROM_TAG, REFERENCE_BATCH_SIZE,
};
pub use stages::{
    content_record_count, CloseSaveStage, FinalSavingStage, OpenSaveStage, WriteCollectionStage,
    WriteHeaderStage,
};
pub use state::{move_file, temp_path_for, SaveContext, SavingState};
