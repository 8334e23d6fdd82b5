use std::collections::HashSet;

use crate::document::read_document;
use crate::error::StageError;
use crate::messages::{Messages, Severity};
use crate::operation::Stage;

use super::state::MergeState;

/// Copies land textures that merged land refers to but the target lacks,
/// taking them from the last source that defines them.
///
/// Steps are counted from the sources' land at prepare time; steps past the
/// merged land's length do nothing.
pub struct PopulateLandTexturesStage;

impl Stage<MergeState> for PopulateLandTexturesStage {
    fn setup(&mut self, context: &mut MergeState) -> Result<usize, StageError> {
        let mut steps = 0;
        for source in context.sources() {
            steps += read_document(source)?.data.land.len();
        }
        Ok(steps)
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut MergeState,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let (land_id, missing) = {
            let data = &context.target()?.data;
            let Some(record) = data.land.get(step) else {
                return Ok(());
            };
            if record.is_deleted() {
                return Ok(());
            }
            let missing: Vec<String> = record
                .get()
                .textures
                .iter()
                .filter(|t| !t.is_empty() && !data.land_textures.contains_live(t))
                .cloned()
                .collect();
            (record.id.clone(), missing)
        };
        if missing.is_empty() {
            return Ok(());
        }

        let sources = context.sources().to_vec();
        for texture in missing {
            if context.target()?.data.land_textures.contains_live(&texture) {
                continue;
            }
            let mut found = None;
            for source in sources.iter().rev() {
                let source = read_document(source)?;
                if let Some(record) = source.data.land_textures.record(&texture) {
                    if !record.is_deleted() {
                        found = Some((record.id.clone(), record.get().clone()));
                        break;
                    }
                }
            }
            match found {
                Some((id, value)) => context
                    .target_mut()?
                    .data
                    .land_textures
                    .merge_in(&id, value),
                None => messages.add_with_severity(
                    &land_id,
                    format!("Land texture '{}' is not defined in any source", texture),
                    "",
                    Severity::Warning,
                ),
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "populate land textures"
    }
}

/// Removes land textures no merged land refers to.
pub struct PurgeLandTexturesStage;

impl Stage<MergeState> for PurgeLandTexturesStage {
    fn setup(&mut self, _context: &mut MergeState) -> Result<usize, StageError> {
        Ok(1)
    }

    fn perform(
        &mut self,
        _step: usize,
        context: &mut MergeState,
        _messages: &mut Messages,
    ) -> Result<(), StageError> {
        let data = &mut context.target_mut()?.data;
        let used: HashSet<String> = data
            .land
            .iter()
            .filter(|r| !r.is_deleted())
            .flat_map(|r| r.get().textures.iter())
            .map(|t| t.to_ascii_lowercase())
            .collect();
        let unused: Vec<String> = data
            .land_textures
            .iter()
            .filter(|r| !used.contains(&r.id.to_ascii_lowercase()))
            .map(|r| r.id.clone())
            .collect();
        for id in unused {
            data.land_textures.erase(&id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "purge land textures"
    }
}
