use crate::document::{Document, SharedDocument};
use crate::error::StageError;

/// Context of a merge: the documents merged, in precedence order (later
/// wins), and the target they are merged into.
pub struct MergeState {
    sources: Vec<SharedDocument>,
    target: Option<Document>,
    completed: bool,
}

impl MergeState {
    pub fn new(sources: Vec<SharedDocument>, target: Document) -> Self {
        Self {
            sources,
            target: Some(target),
            completed: false,
        }
    }

    pub fn sources(&self) -> &[SharedDocument] {
        &self.sources
    }

    pub fn target(&self) -> Result<&Document, StageError> {
        self.target.as_ref().ok_or(StageError::TargetReleased)
    }

    pub fn target_mut(&mut self) -> Result<&mut Document, StageError> {
        self.target.as_mut().ok_or(StageError::TargetReleased)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn set_completed(&mut self) {
        self.completed = true;
    }

    /// Hands the target over once the merge has completed.
    pub(crate) fn take_target(&mut self) -> Option<Document> {
        if self.completed {
            self.target.take()
        } else {
            None
        }
    }
}
