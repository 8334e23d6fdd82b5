use crate::codec::RecordKind;
use crate::document::{read_document, Scope};
use crate::error::StageError;
use crate::messages::{Messages, Severity};
use crate::operation::Stage;

use super::state::SaveContext;

/// Writes dirty land records. Texture ids a land uses but the document does
/// not define are reported as warnings; the land is still written.
pub struct WriteLandCollectionStage;

impl Stage<SaveContext> for WriteLandCollectionStage {
    fn setup(&mut self, context: &mut SaveContext) -> Result<usize, StageError> {
        let doc = read_document(&context.document)?;
        Ok(doc.data.land.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut SaveContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;
        let Some(record) = data.land.get(step) else {
            return Ok(());
        };
        if !record.is_dirty() || Scope::of(&record.id) != Scope::Content {
            return Ok(());
        }

        let writer = context.state.writer()?;
        writer.start_record(RecordKind::Land, &record.id)?;
        if record.is_deleted() {
            writer.mark_deleted()?;
            writer.end_record()?;
            return Ok(());
        }

        let land = record.get();
        let mut missing: Vec<&str> = land
            .textures
            .iter()
            .map(|t| t.as_str())
            .filter(|t| !t.is_empty() && !data.land_textures.contains_live(t))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        for texture in missing {
            messages.add_with_severity(
                &record.id,
                format!("Land texture '{}' is not defined", texture),
                "",
                Severity::Warning,
            );
        }

        writer.write_body(land)?;
        writer.end_record()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "write land"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Header;
    use crate::document::{Document, Land, LandTexture};
    use crate::operation::ErrorFlag;
    use crate::saving::state::SavingState;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_textures_are_reported_once() {
        let tmp = TempDir::new().unwrap();
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.land_textures.modify(
            "grass",
            LandTexture {
                texture: "grass.dds".to_string(),
            },
        );
        data.land.modify(
            "#0 0",
            Land {
                x: 0,
                y: 0,
                textures: vec!["grass".into(), "mud".into(), "mud".into(), String::new()],
            },
        );
        let mut ctx = SaveContext {
            document: document.into_shared(),
            state: SavingState::new(PathBuf::new(), tmp.path().join("out.json")),
            error: ErrorFlag::default(),
        };
        ctx.state.open(false).unwrap();
        ctx.state
            .writer()
            .unwrap()
            .write_header(&Header::new("", "", 1, false))
            .unwrap();

        let mut stage = WriteLandCollectionStage;
        let mut messages = Messages::default();
        assert_eq!(stage.setup(&mut ctx).unwrap(), 1);
        stage.perform(0, &mut ctx, &mut messages).unwrap();

        assert_eq!(messages.len(), 1);
        assert!(messages.iter().next().unwrap().text.contains("mud"));
        assert_eq!(ctx.state.writer().unwrap().records_written(), 1);
    }
}
