use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::codec::RecordKind;
use crate::document::{parse_exterior_id, read_document, Collection, CellRef, Data, Scope};
use crate::error::StageError;
use crate::messages::{Messages, Severity};
use crate::operation::Stage;

use super::state::SaveContext;

/// References bucketed per collation step.
pub const REFERENCE_BATCH_SIZE: usize = 100;

/// Sub-record written before the body of a reference that changed cells.
pub const MOVED_FROM_TAG: &str = "moved_from";

fn saved_reference(collection: &Collection<CellRef>, index: usize) -> bool {
    collection
        .get(index)
        .map(|r| r.is_dirty() && Scope::of(&r.id) == Scope::Content)
        .unwrap_or(false)
}

/// Lower-cased id of the cell a reference is saved under.
fn cell_key(reference: &CellRef) -> String {
    reference.cell.to_ascii_lowercase()
}

/// Buckets dirty references by the cell they now live in.
pub struct CollectionReferencesStage;

impl Stage<SaveContext> for CollectionReferencesStage {
    fn setup(&mut self, context: &mut SaveContext) -> Result<usize, StageError> {
        context.state.sub_records.clear();
        let doc = read_document(&context.document)?;
        Ok(doc.data.references.len().div_ceil(REFERENCE_BATCH_SIZE))
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let references = &doc.data.references;
        let start = step * REFERENCE_BATCH_SIZE;
        let end = (start + REFERENCE_BATCH_SIZE).min(references.len());

        for index in start..end {
            if !saved_reference(references, index) {
                continue;
            }
            let Some(record) = references.get(index) else {
                continue;
            };
            let reference = record.get();
            let bucket = context
                .state
                .sub_records
                .entry(cell_key(reference))
                .or_default();
            if reference.is_moved() {
                bucket.push_back(index);
            } else {
                bucket.push_front(index);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "collate references"
    }
}

/// Orders every bucket deterministically: stayed references first by
/// reference number (unnumbered last), then moved references in collection
/// order.
pub struct SortCollatedReferencesStage;

impl Stage<SaveContext> for SortCollatedReferencesStage {
    fn setup(&mut self, _context: &mut SaveContext) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let references = &doc.data.references;

        for bucket in context.state.sub_records.values_mut() {
            let (mut stayed, mut moved): (Vec<usize>, Vec<usize>) = bucket
                .iter()
                .copied()
                .partition(|&i| references.get(i).map(|r| !r.get().is_moved()).unwrap_or(true));
            stayed.sort_by_key(|&i| {
                let ref_num = references.get(i).and_then(|r| r.get().ref_num);
                (ref_num.is_none(), ref_num, i)
            });
            moved.sort_unstable();
            *bucket = stayed.into_iter().chain(moved).collect::<VecDeque<usize>>();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sort collated references"
    }
}

/// Writes cells together with the references collated for them.
///
/// One step per cell plus a last step reporting references whose cell does
/// not exist.
pub struct WriteCellCollectionStage {
    cells: usize,
}

impl WriteCellCollectionStage {
    pub fn new() -> Self {
        Self { cells: 0 }
    }
}

impl Default for WriteCellCollectionStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Next reference number after `num`, or an error once the cell is full.
pub(crate) fn next_ref_num(cell: &str, num: u32) -> Result<u32, StageError> {
    num.checked_add(1).ok_or_else(|| {
        StageError::Failed(format!("Cell '{}' has run out of reference numbers", cell))
    })
}

/// Reference numbers for a cell's bucket: the raised counter and the number
/// each live reference is written with.
fn plan_ref_nums(
    cell: &str,
    references: &Collection<CellRef>,
    bucket: &VecDeque<usize>,
    counter: u32,
) -> Result<(u32, HashMap<usize, Option<u32>>), StageError> {
    let mut counter = counter;
    for &index in bucket {
        if let Some(record) = references.get(index) {
            let reference = record.get();
            if let (false, Some(num)) = (reference.is_moved(), reference.ref_num) {
                counter = counter.max(next_ref_num(cell, num)?);
            }
        }
    }

    let mut assigned = HashMap::new();
    for &index in bucket {
        let Some(record) = references.get(index) else {
            continue;
        };
        let reference = record.get();
        let num = if record.is_deleted() || (!reference.is_moved() && reference.ref_num.is_some()) {
            reference.ref_num
        } else {
            let fresh = counter;
            counter = next_ref_num(cell, counter)?;
            Some(fresh)
        };
        assigned.insert(index, num);
    }
    Ok((counter, assigned))
}

impl Stage<SaveContext> for WriteCellCollectionStage {
    fn setup(&mut self, context: &mut SaveContext) -> Result<usize, StageError> {
        let doc = read_document(&context.document)?;
        self.cells = doc.data.cells.len();
        Ok(self.cells + 1)
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut SaveContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;

        if step >= self.cells {
            let mut leftovers: Vec<(String, VecDeque<usize>)> =
                context.state.sub_records.drain().collect();
            leftovers.sort();
            for (cell, bucket) in leftovers {
                for index in bucket {
                    if let Some(record) = data.references.get(index) {
                        messages.add_with_severity(
                            &record.id,
                            format!("Reference refers to unknown cell '{}'", cell),
                            "",
                            Severity::Warning,
                        );
                    }
                }
            }
            return Ok(());
        }

        let Some(record) = data.cells.get(step) else {
            return Ok(());
        };
        if Scope::of(&record.id) != Scope::Content {
            return Ok(());
        }
        let bucket = context
            .state
            .sub_records
            .remove(&record.id.to_ascii_lowercase());
        if !record.is_dirty() && bucket.is_none() {
            return Ok(());
        }

        let writer = context.state.writer()?;
        if record.is_deleted() {
            writer.start_record(RecordKind::Cell, &record.id)?;
            writer.mark_deleted()?;
            writer.end_record()?;
            return Ok(());
        }

        let bucket = bucket.unwrap_or_default();
        let mut cell = record.get().clone();
        match parse_exterior_id(&record.id) {
            Some(grid) => {
                cell.interior = false;
                cell.grid = Some(grid);
            }
            None => {
                cell.interior = true;
                cell.grid = None;
            }
        }
        let (counter, assigned) =
            plan_ref_nums(&record.id, &data.references, &bucket, cell.ref_num_counter)?;
        cell.ref_num_counter = counter;

        writer.start_record(RecordKind::Cell, &record.id)?;
        writer.write_body(&cell)?;
        writer.end_record()?;

        for index in bucket {
            let Some(ref_record) = data.references.get(index) else {
                continue;
            };
            writer.start_record(RecordKind::CellRef, &ref_record.id)?;
            if ref_record.is_deleted() {
                writer.mark_deleted()?;
                writer.end_record()?;
                continue;
            }

            let mut reference = ref_record.get().clone();
            if reference.is_moved() {
                writer.write_sub(MOVED_FROM_TAG, &reference.original_cell)?;
            }
            reference.ref_num = assigned.get(&index).copied().flatten();
            reference.original_cell = reference.cell.clone();
            writer.write_body(&reference)?;
            writer.end_record()?;
        }
        debug!("Wrote cell {} (ref num counter {})", record.id, counter);
        Ok(())
    }

    fn name(&self) -> &str {
        "write cells"
    }
}

/// Cells and references the cell stage writes for `data`.
pub fn cell_record_count(data: &Data) -> usize {
    let mut pending: HashMap<String, usize> = HashMap::new();
    for index in 0..data.references.len() {
        if saved_reference(&data.references, index) {
            if let Some(record) = data.references.get(index) {
                *pending.entry(cell_key(record.get())).or_default() += 1;
            }
        }
    }

    let mut seen = HashSet::new();
    let mut count = 0;
    for record in data.cells.iter() {
        if Scope::of(&record.id) != Scope::Content {
            continue;
        }
        let key = record.id.to_ascii_lowercase();
        if !seen.insert(key.clone()) {
            continue;
        }
        let refs = pending.get(&key).copied().unwrap_or(0);
        if record.is_dirty() || refs > 0 {
            count += 1;
        }
        if !record.is_deleted() {
            count += refs;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordReader;
    use crate::document::{Cell, Document};
    use crate::operation::ErrorFlag;
    use crate::saving::state::{temp_path_for, SavingState};
    use crate::codec::Header;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(tmp: &TempDir, document: Document) -> SaveContext {
        SaveContext {
            document: document.into_shared(),
            state: SavingState::new(PathBuf::new(), tmp.path().join("out.json")),
            error: ErrorFlag::default(),
        }
    }

    fn run(stage: &mut dyn Stage<SaveContext>, ctx: &mut SaveContext) -> Messages {
        let mut messages = Messages::default();
        let steps = stage.setup(ctx).unwrap();
        for step in 0..steps {
            stage.perform(step, ctx, &mut messages).unwrap();
        }
        messages
    }

    fn numbered(cell: &str, num: u32) -> CellRef {
        let mut reference = CellRef::new(cell, "rock");
        reference.ref_num = Some(num);
        reference
    }

    #[test]
    fn test_setup_returns_batches_of_one_hundred() {
        let tmp = TempDir::new().unwrap();
        for (count, batches) in [(0, 0), (1, 1), (100, 1), (101, 2), (250, 3)] {
            let mut document = Document::new(vec![], PathBuf::new(), true);
            for i in 0..count {
                document
                    .edit()
                    .references
                    .modify(&format!("ref{}", i), CellRef::new("Balmora", "rock"));
            }
            let mut ctx = context(&tmp, document);
            assert_eq!(CollectionReferencesStage.setup(&mut ctx).unwrap(), batches);
        }
    }

    #[test]
    fn test_collation_puts_moved_references_last() {
        let tmp = TempDir::new().unwrap();
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.references.load("stay1", numbered("Vivec", 3), true);
        data.references.load("moved", numbered("Balmora", 1), true);
        data.references.load("stay2", numbered("Vivec", 1), true);
        data.references.load("clean", numbered("Vivec", 2), true);
        let mut moved = numbered("Balmora", 1);
        moved.cell = "Vivec".to_string();
        data.references.modify("moved", moved);
        data.references.modify("stay1", numbered("Vivec", 3));
        data.references.modify("stay2", numbered("Vivec", 1));
        data.references.modify("fresh", CellRef::new("vivec", "door"));
        let mut ctx = context(&tmp, document);

        run(&mut CollectionReferencesStage, &mut ctx);
        let bucket = ctx.state.sub_records.get("vivec").unwrap().clone();
        // push_front reverses stayed references, moved ones trail.
        assert_eq!(bucket, VecDeque::from(vec![4, 2, 0, 1]));

        run(&mut SortCollatedReferencesStage, &mut ctx);
        let bucket = ctx.state.sub_records.get("vivec").unwrap().clone();
        assert_eq!(bucket, VecDeque::from(vec![2, 0, 4, 1]));
    }

    #[test]
    fn test_cell_stage_assigns_fresh_numbers_and_marks_moves() {
        let tmp = TempDir::new().unwrap();
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.cells.load("#2 -1", Cell::named("Wilderness"), true);
        data.cells.load("Vivec", Cell::named("Vivec"), true);
        data.references.load("old", numbered("Vivec", 7), true);
        data.references.load("traveller", numbered("#2 -1", 2), true);
        let mut traveller = numbered("#2 -1", 2);
        traveller.cell = "Vivec".to_string();
        data.references.modify("traveller", traveller);
        data.references.modify("old", numbered("Vivec", 7));
        data.references.modify("new", CellRef::new("Vivec", "chair"));
        data.references.modify("lost", CellRef::new("Nowhere", "chair"));
        let mut ctx = context(&tmp, document);
        let expected = cell_record_count(&ctx.document.read().unwrap().data);

        ctx.state.open(false).unwrap();
        ctx.state
            .writer()
            .unwrap()
            .write_header(&Header::new("", "", 0, false))
            .unwrap();
        run(&mut CollectionReferencesStage, &mut ctx);
        run(&mut SortCollatedReferencesStage, &mut ctx);
        let messages = run(&mut WriteCellCollectionStage::new(), &mut ctx);
        ctx.state.close().unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages.iter().next().unwrap().subject.as_deref(), Some("lost"));

        let mut reader = RecordReader::open(temp_path_for(&tmp.path().join("out.json"))).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        assert_eq!(records.len(), expected);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Vivec", "old", "new", "traveller"]);

        let cell: Cell = serde_json::from_value(records[0].body.clone()).unwrap();
        assert!(cell.interior);
        assert_eq!(cell.ref_num_counter, 10);

        let fresh: CellRef = serde_json::from_value(records[2].body.clone()).unwrap();
        assert_eq!(fresh.ref_num, Some(8));
        assert!(records[2].sub(MOVED_FROM_TAG).is_none());

        let moved: CellRef = serde_json::from_value(records[3].body.clone()).unwrap();
        assert_eq!(moved.ref_num, Some(9));
        assert_eq!(moved.original_cell, "Vivec");
        assert_eq!(
            records[3].sub(MOVED_FROM_TAG),
            Some(&serde_json::json!("#2 -1"))
        );
    }

    #[test]
    fn test_highest_reference_number_fails_the_cell_stage() {
        let tmp = TempDir::new().unwrap();
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.cells.load("Vivec", Cell::named("Vivec"), true);
        data.references.load("last", numbered("Vivec", u32::MAX), true);
        data.references.modify("last", numbered("Vivec", u32::MAX));
        let mut ctx = context(&tmp, document);

        ctx.state.open(false).unwrap();
        ctx.state
            .writer()
            .unwrap()
            .write_header(&Header::new("", "", 0, false))
            .unwrap();
        run(&mut CollectionReferencesStage, &mut ctx);
        run(&mut SortCollatedReferencesStage, &mut ctx);

        let mut stage = WriteCellCollectionStage::new();
        let mut messages = Messages::default();
        assert_eq!(stage.setup(&mut ctx).unwrap(), 2);
        let err = stage.perform(0, &mut ctx, &mut messages).unwrap_err();
        assert!(matches!(err, StageError::Failed(_)));
        assert!(err.to_string().contains("Vivec"));
    }

    #[test]
    fn test_exterior_flags_follow_cell_id() {
        let tmp = TempDir::new().unwrap();
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let mut wrongly_interior = Cell::named("Wilderness");
        wrongly_interior.interior = true;
        document.edit().cells.modify("#-3 4", wrongly_interior);
        let mut ctx = context(&tmp, document);

        ctx.state.open(false).unwrap();
        ctx.state
            .writer()
            .unwrap()
            .write_header(&Header::new("", "", 0, false))
            .unwrap();
        run(&mut CollectionReferencesStage, &mut ctx);
        run(&mut WriteCellCollectionStage::new(), &mut ctx);
        ctx.state.close().unwrap();

        let mut reader = RecordReader::open(temp_path_for(&tmp.path().join("out.json"))).unwrap();
        let record = reader.next_record().unwrap().unwrap();
        let cell: Cell = serde_json::from_value(record.body).unwrap();
        assert!(!cell.interior);
        assert_eq!(cell.grid, Some((-3, 4)));
    }
}
