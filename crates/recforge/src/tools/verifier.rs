use crate::document::{read_document, Scope, SharedDocument};
use crate::error::{StageError, WorkerError};
use crate::messages::{Messages, Severity};
use crate::operation::{Operation, OperationKind, Stage, UserSettings, WorkerOperation};

use super::ScanContext;

pub const MANDATORY_IDS_SETTING: &str = "verifier/mandatory-ids";
pub const ALLOW_EMPTY_INFO_TEXT_SETTING: &str = "verifier/allow-empty-info-text";

/// Globals every playable content set has to define.
pub const DEFAULT_MANDATORY_IDS: &[&str] = &[
    "Day",
    "DaysPassed",
    "GameHour",
    "Month",
    "PCRace",
    "PCVampire",
    "PCWerewolf",
    "PCYear",
];

/// Reports mandatory globals that are missing or deleted.
pub struct MandatoryIdStage {
    ids: Vec<String>,
}

impl MandatoryIdStage {
    pub fn new() -> Self {
        Self {
            ids: DEFAULT_MANDATORY_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for MandatoryIdStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage<ScanContext> for MandatoryIdStage {
    fn setup(&mut self, _context: &mut ScanContext) -> Result<usize, StageError> {
        Ok(self.ids.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut ScanContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        if let Some(id) = self.ids.get(step) {
            if !doc.data.globals.contains_live(id) {
                messages.add(id, format!("Missing mandatory record: {}", id), "");
            }
        }
        Ok(())
    }

    fn update_user_setting(&mut self, name: &str, values: &[String]) {
        if name == MANDATORY_IDS_SETTING {
            self.ids = values.to_vec();
        }
    }

    fn name(&self) -> &str {
        "mandatory ids"
    }
}

/// Checks that every live reference points at an existing object and cell.
pub struct ReferenceCheckStage;

impl Stage<ScanContext> for ReferenceCheckStage {
    fn setup(&mut self, context: &mut ScanContext) -> Result<usize, StageError> {
        Ok(read_document(&context.document)?.data.references.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut ScanContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;
        let Some(record) = data.references.get(step) else {
            return Ok(());
        };
        if record.is_deleted() || Scope::of(&record.id) == Scope::Session {
            return Ok(());
        }
        let reference = record.get();
        if !data.referenceables.contains_live(&reference.object) {
            messages.add(
                &record.id,
                format!("Reference to unknown object '{}'", reference.object),
                "object",
            );
        }
        if !data.cells.contains_live(&reference.cell) {
            messages.add(
                &record.id,
                format!("Reference placed in unknown cell '{}'", reference.cell),
                "cell",
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "references"
    }
}

/// Checks that infos belong to an existing topic and carry text.
pub struct TopicInfoCheckStage {
    allow_empty_text: bool,
}

impl TopicInfoCheckStage {
    pub fn new() -> Self {
        Self {
            allow_empty_text: false,
        }
    }
}

impl Default for TopicInfoCheckStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage<ScanContext> for TopicInfoCheckStage {
    fn setup(&mut self, context: &mut ScanContext) -> Result<usize, StageError> {
        Ok(read_document(&context.document)?.data.infos.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut ScanContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;
        let Some(record) = data.infos.get(step) else {
            return Ok(());
        };
        if record.is_deleted() {
            return Ok(());
        }
        let info = record.get();
        if !data.topics.contains_live(&info.topic) {
            messages.add(
                &record.id,
                format!("Info belongs to unknown topic '{}'", info.topic),
                "topic",
            );
        }
        if !self.allow_empty_text && info.text.trim().is_empty() {
            messages.add_with_severity(&record.id, "Info has no text", "text", Severity::Warning);
        }
        Ok(())
    }

    fn update_user_setting(&mut self, name: &str, values: &[String]) {
        if name == ALLOW_EMPTY_INFO_TEXT_SETTING {
            self.allow_empty_text = values
                .first()
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
        }
    }

    fn name(&self) -> &str {
        "topic infos"
    }
}

/// Checks that land only uses defined land textures.
pub struct LandTextureCheckStage;

impl Stage<ScanContext> for LandTextureCheckStage {
    fn setup(&mut self, context: &mut ScanContext) -> Result<usize, StageError> {
        Ok(read_document(&context.document)?.data.land.len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut ScanContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let data = &doc.data;
        let Some(record) = data.land.get(step) else {
            return Ok(());
        };
        if record.is_deleted() {
            return Ok(());
        }
        for (i, texture) in record.get().textures.iter().enumerate() {
            if !texture.is_empty() && !data.land_textures.contains_live(texture) {
                messages.add(
                    &record.id,
                    format!("Land uses unknown texture '{}'", texture),
                    format!("textures:{}", i),
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "land textures"
    }
}

/// Builds the verifier for `document`.
pub fn verifier_operation(document: SharedDocument, settings: UserSettings) -> Operation<ScanContext> {
    let mut op = Operation::new(OperationKind::Verify, false, false, ScanContext { document });
    op.set_default_severity(Severity::Error);
    op.configure_settings(settings);
    op.append_stage(MandatoryIdStage::new());
    op.append_stage(ReferenceCheckStage);
    op.append_stage(TopicInfoCheckStage::new());
    op.append_stage(LandTextureCheckStage);
    op
}

/// Runs the verifier on its own thread.
pub fn spawn_verifier(
    document: SharedDocument,
    settings: UserSettings,
) -> Result<WorkerOperation<ScanContext>, WorkerError> {
    WorkerOperation::spawn(verifier_operation(document, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CellRef, Document, GenericRecord, Info, Land};
    use crate::messages::Message;
    use crate::operation::OperationEvent;
    use std::path::PathBuf;

    fn messages_of(events: Vec<OperationEvent>) -> Vec<Message> {
        events
            .into_iter()
            .filter_map(|e| match e {
                OperationEvent::Message { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn settings(ids: &[&str]) -> UserSettings {
        let mut settings = UserSettings::new();
        settings.insert(
            MANDATORY_IDS_SETTING.to_string(),
            ids.iter().map(|s| s.to_string()).collect(),
        );
        settings
    }

    #[test]
    fn test_verifier_reports_each_problem() {
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.globals.modify("gamehour", GenericRecord::new());
        data.referenceables.modify("rock", GenericRecord::new());
        data.references.modify("r1", CellRef::new("Nowhere", "rock"));
        data.references.modify("r2", CellRef::new("Nowhere", "ghost"));
        data.infos.modify("i1", Info::new("missing_topic", ""));
        data.land.modify(
            "#0 0",
            Land {
                x: 0,
                y: 0,
                textures: vec!["dirt".into()],
            },
        );

        let worker =
            spawn_verifier(document.into_shared(), settings(&["GameHour", "DaysPassed"])).unwrap();
        let events: Vec<OperationEvent> = worker.events().iter().collect();
        let op = worker.join().unwrap();

        let messages = messages_of(events);
        let subjects: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.subject.as_deref())
            .collect();
        assert_eq!(
            subjects,
            vec!["DaysPassed", "r1", "r2", "r2", "i1", "i1", "#0 0"]
        );
        assert_eq!(messages[0].severity, Severity::Error);
        assert_eq!(messages[5].severity, Severity::Warning);
        assert!(!op.has_error());
    }

    #[test]
    fn test_empty_info_text_can_be_allowed() {
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.topics.modify("greeting", Default::default());
        data.infos.modify("i1", Info::new("greeting", " "));

        let mut settings = settings(&[]);
        settings.insert(
            ALLOW_EMPTY_INFO_TEXT_SETTING.to_string(),
            vec!["true".to_string()],
        );
        let mut op = verifier_operation(document.into_shared(), settings);
        let (tx, rx) = crossbeam_channel::unbounded();
        op.add_reporter(Box::new(crate::operation::ChannelReporter::new(tx)));

        assert!(op.run_to_completion());
        assert!(messages_of(rx.try_iter().collect()).is_empty());
    }
}
