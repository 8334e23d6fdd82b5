use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::codec::RecordKind;
use crate::document::{read_document, CellRef, Collection, Data, Scope};
use crate::error::StageError;
use crate::messages::Messages;
use crate::operation::Stage;
use crate::saving::references::next_ref_num;

use super::state::MergeState;

pub type SourceAccessor<T> = fn(&Data) -> &Collection<T>;
pub type TargetAccessor<T> = fn(&mut Data) -> &mut Collection<T>;

/// Copies one collection of every source into the target, one source per
/// step. Later sources override earlier ones; a deletion in a later source
/// removes the record again.
pub struct MergeCollectionStage<T> {
    kind: RecordKind,
    source: SourceAccessor<T>,
    target: TargetAccessor<T>,
}

impl<T> MergeCollectionStage<T> {
    pub fn new(kind: RecordKind, source: SourceAccessor<T>, target: TargetAccessor<T>) -> Self {
        Self {
            kind,
            source,
            target,
        }
    }
}

impl<T: Clone + 'static> Stage<MergeState> for MergeCollectionStage<T> {
    fn setup(&mut self, context: &mut MergeState) -> Result<usize, StageError> {
        Ok(context.sources().len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut MergeState,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let Some(source) = context.sources().get(step).map(Arc::clone) else {
            return Ok(());
        };
        let source = read_document(&source)?;
        let target = (self.target)(&mut context.target_mut()?.data);

        let mut merged = 0;
        for record in (self.source)(&source.data).iter() {
            if Scope::of(&record.id) == Scope::Session {
                continue;
            }
            if record.is_deleted() {
                target.erase(&record.id);
            } else {
                target.merge_in(&record.id, record.get().clone());
                merged += 1;
            }
        }
        debug!("Merged {} {} records from source {}", merged, self.kind, step);
        Ok(())
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

/// Merges references, one source per step, then numbers them.
///
/// The last step hands out fresh per-cell reference numbers over the merged
/// target and raises the target cells' counters to match, so overridden
/// references leave no gaps.
pub struct MergeReferencesStage {
    sources: usize,
}

impl MergeReferencesStage {
    pub fn new() -> Self {
        Self { sources: 0 }
    }
}

impl Default for MergeReferencesStage {
    fn default() -> Self {
        Self::new()
    }
}

fn number_references(data: &mut Data) -> Result<(), StageError> {
    let mut counters: HashMap<String, u32> = HashMap::new();
    let mut numbered = Vec::new();
    for record in data.references.iter() {
        if record.is_deleted() {
            continue;
        }
        let mut reference: CellRef = record.get().clone();
        let counter = counters
            .entry(reference.cell.to_ascii_lowercase())
            .or_insert(1);
        reference.ref_num = Some(*counter);
        *counter = next_ref_num(&reference.cell, *counter)?;
        reference.original_cell = reference.cell.clone();
        numbered.push((record.id.clone(), reference));
    }
    for (id, reference) in numbered {
        data.references.merge_in(&id, reference);
    }

    for (key, counter) in counters {
        let Some(cell) = data.cells.record(&key) else {
            continue;
        };
        if cell.is_deleted() || cell.get().ref_num_counter >= counter {
            continue;
        }
        let id = cell.id.clone();
        let mut value = cell.get().clone();
        value.ref_num_counter = counter;
        data.cells.merge_in(&id, value);
    }
    Ok(())
}

impl Stage<MergeState> for MergeReferencesStage {
    fn setup(&mut self, context: &mut MergeState) -> Result<usize, StageError> {
        self.sources = context.sources().len();
        Ok(self.sources + 1)
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut MergeState,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        if step >= self.sources {
            return number_references(&mut context.target_mut()?.data);
        }
        let Some(source) = context.sources().get(step).map(Arc::clone) else {
            return Ok(());
        };
        let source = read_document(&source)?;
        let target = &mut context.target_mut()?.data;

        for record in source.data.references.iter() {
            if Scope::of(&record.id) == Scope::Session {
                continue;
            }
            if record.is_deleted() {
                target.references.erase(&record.id);
            } else {
                target.references.merge_in(&record.id, record.get().clone());
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "merge references"
    }
}

/// Marks the merge complete; the target is handed off afterwards.
pub struct FinishMergedDocumentStage;

impl Stage<MergeState> for FinishMergedDocumentStage {
    fn setup(&mut self, _context: &mut MergeState) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut MergeState,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let target = context.target_mut()?;
        // Everything in the target is new relative to its dependencies.
        target.edit();
        context.set_completed();
        Ok(())
    }

    fn name(&self) -> &str {
        "finish merged document"
    }
}
