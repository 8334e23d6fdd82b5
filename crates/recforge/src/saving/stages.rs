use std::fs;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{Header, Master, RecordKind};
use crate::document::{read_document, write_document, Collection, Data, Scope};
use crate::error::StageError;
use crate::messages::{Messages, Severity};
use crate::operation::Stage;

use super::state::{move_file, SaveContext};

/// Selects one collection of a document.
pub type Accessor<T> = fn(&Data) -> &Collection<T>;

/// Opens the project file (in place) or the content temp file.
pub struct OpenSaveStage {
    project: bool,
}

impl OpenSaveStage {
    pub fn new(project: bool) -> Self {
        Self { project }
    }
}

impl Stage<SaveContext> for OpenSaveStage {
    fn setup(&mut self, _context: &mut SaveContext) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        if self.project {
            write_document(&context.document)?.set_saving(true);
        }
        context.state.open(self.project)
    }

    fn name(&self) -> &str {
        if self.project {
            "open project file"
        } else {
            "open content file"
        }
    }
}

/// Writes the file header with the number of records the file will carry.
pub struct WriteHeaderStage {
    project: bool,
}

impl WriteHeaderStage {
    pub fn new(project: bool) -> Self {
        Self { project }
    }
}

impl Stage<SaveContext> for WriteHeaderStage {
    fn setup(&mut self, _context: &mut SaveContext) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut SaveContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let count = if self.project {
            doc.data.count_project_records()
        } else {
            content_record_count(&doc.data)
        };
        let mut header = Header::new(&doc.author, &doc.description, count, self.project);

        if !self.project {
            for path in doc.masters() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let size = match fs::metadata(path) {
                    Ok(meta) => meta.len(),
                    Err(_) => {
                        messages.add_with_severity(
                            &name,
                            format!("Dependency {} not found", path.display()),
                            "",
                            Severity::Warning,
                        );
                        0
                    }
                };
                header.masters.push(Master { name, size });
            }
        }

        debug!(
            "Writing header for {} ({} records)",
            context.state.tmp_path().display(),
            count
        );
        context.state.writer()?.write_header(&header)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "write header"
    }
}

/// Writes every dirty record of one collection that falls into `scope`,
/// one record per step.
pub struct WriteCollectionStage<T> {
    kind: RecordKind,
    scope: Scope,
    accessor: Accessor<T>,
}

impl<T> WriteCollectionStage<T> {
    pub fn new(kind: RecordKind, scope: Scope, accessor: Accessor<T>) -> Self {
        Self {
            kind,
            scope,
            accessor,
        }
    }
}

impl<T: Clone + Serialize + 'static> Stage<SaveContext> for WriteCollectionStage<T> {
    fn setup(&mut self, context: &mut SaveContext) -> Result<usize, StageError> {
        let doc = read_document(&context.document)?;
        Ok((self.accessor)(&doc.data).len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let Some(record) = (self.accessor)(&doc.data).get(step) else {
            return Ok(());
        };
        if !record.is_dirty() || Scope::of(&record.id) != self.scope {
            return Ok(());
        }

        let writer = context.state.writer()?;
        writer.start_record(self.kind, &record.id)?;
        if record.is_deleted() {
            writer.mark_deleted()?;
        } else {
            writer.write_body(record.get())?;
        }
        writer.end_record()?;
        Ok(())
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

pub struct CloseSaveStage;

impl Stage<SaveContext> for CloseSaveStage {
    fn setup(&mut self, _context: &mut SaveContext) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        context.state.close()
    }

    fn name(&self) -> &str {
        "close file"
    }
}

/// Commits or discards the content file. Runs even after an abort.
pub struct FinalSavingStage;

impl Stage<SaveContext> for FinalSavingStage {
    fn setup(&mut self, _context: &mut SaveContext) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut SaveContext,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        write_document(&context.document)?.set_saving(false);
        let state = &mut context.state;

        if context.error.is_set() {
            state.discard();
            // The project file is written in place and never removed.
            if !state.is_project_file() && state.tmp_path().exists() {
                warn!("Save failed, removing {}", state.tmp_path().display());
                fs::remove_file(state.tmp_path()).map_err(|e| StageError::Io {
                    path: state.tmp_path().to_path_buf(),
                    source: e,
                })?;
            }
            return Ok(());
        }

        if state.is_project_file() {
            return Ok(());
        }

        let destination = state.path().to_path_buf();
        if destination.exists() {
            fs::remove_file(&destination).map_err(|e| StageError::Io {
                path: destination.clone(),
                source: e,
            })?;
        }
        move_file(state.tmp_path(), &destination)?;

        write_document(&context.document)?.mark_clean();
        info!("Saved {}", destination.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "finalise save"
    }
}

fn dirty_content<T: Clone>(collection: &Collection<T>) -> usize {
    collection.count_dirty_in(Scope::Content)
}

/// Number of records the content file stages write for `data`.
pub fn content_record_count(data: &Data) -> usize {
    let plain = [
        dirty_content(&data.globals),
        dirty_content(&data.game_settings),
        dirty_content(&data.skills),
        dirty_content(&data.classes),
        dirty_content(&data.factions),
        dirty_content(&data.races),
        dirty_content(&data.sounds),
        dirty_content(&data.scripts),
        dirty_content(&data.regions),
        dirty_content(&data.birthsigns),
        dirty_content(&data.spells),
        dirty_content(&data.enchantments),
        dirty_content(&data.body_parts),
        dirty_content(&data.magic_effects),
        dirty_content(&data.start_scripts),
        dirty_content(&data.referenceables),
        dirty_content(&data.sound_gens),
        dirty_content(&data.pathgrids),
        dirty_content(&data.land_textures),
        dirty_content(&data.land),
    ]
    .iter()
    .sum::<usize>();

    plain + super::references::cell_record_count(data) + super::dialogue::dialogue_record_count(data)
}
