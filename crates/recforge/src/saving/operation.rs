use tracing::info;

use crate::codec::RecordKind;
use crate::document::{read_document, Scope, SharedDocument};
use crate::error::{DocumentError, SaveError};
use crate::operation::{ErrorFlag, Operation, OperationKind};

use super::dialogue::WriteDialogueCollectionStage;
use super::land::WriteLandCollectionStage;
use super::references::{
    CollectionReferencesStage, SortCollatedReferencesStage, WriteCellCollectionStage,
};
use super::stages::{
    CloseSaveStage, FinalSavingStage, OpenSaveStage, WriteCollectionStage, WriteHeaderStage,
};
use super::state::{SaveContext, SavingState};

/// Builds the save pipeline for `document`: the project file first, then
/// the content file in dependency order, then the commit stage that runs
/// even after an abort.
pub fn saving_operation(document: SharedDocument) -> Result<Operation<SaveContext>, SaveError> {
    let (project_path, content_path) = {
        let doc = read_document(&document)?;
        if doc.is_saving() {
            return Err(SaveError::AlreadySaving);
        }
        let content = doc.save_path().ok_or(DocumentError::NoSavePath)?;
        (doc.project_path().to_path_buf(), content.to_path_buf())
    };
    info!(
        "Preparing save of {} (project {})",
        content_path.display(),
        project_path.display()
    );

    let error = ErrorFlag::default();
    let context = SaveContext {
        document,
        state: SavingState::new(project_path, content_path),
        error: error.clone(),
    };
    let mut op = Operation::with_error_flag(OperationKind::Save, true, true, context, error);

    op.append_stage(OpenSaveStage::new(true));
    op.append_stage(WriteHeaderStage::new(true));
    op.append_stage(WriteCollectionStage::new(RecordKind::Filter, Scope::Project, |d| &d.filters));
    op.append_stage(WriteCollectionStage::new(RecordKind::DebugProfile, Scope::Project, |d| {
        &d.debug_profiles
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::Script, Scope::Project, |d| &d.scripts));
    op.append_stage(WriteCollectionStage::new(RecordKind::SelectionGroup, Scope::Project, |d| {
        &d.selection_groups
    }));
    op.append_stage(CloseSaveStage);

    op.append_stage(OpenSaveStage::new(false));
    op.append_stage(WriteHeaderStage::new(false));
    op.append_stage(WriteCollectionStage::new(RecordKind::Global, Scope::Content, |d| &d.globals));
    op.append_stage(WriteCollectionStage::new(RecordKind::GameSetting, Scope::Content, |d| {
        &d.game_settings
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::Skill, Scope::Content, |d| &d.skills));
    op.append_stage(WriteCollectionStage::new(RecordKind::Class, Scope::Content, |d| &d.classes));
    op.append_stage(WriteCollectionStage::new(RecordKind::Faction, Scope::Content, |d| &d.factions));
    op.append_stage(WriteCollectionStage::new(RecordKind::Race, Scope::Content, |d| &d.races));
    op.append_stage(WriteCollectionStage::new(RecordKind::Sound, Scope::Content, |d| &d.sounds));
    op.append_stage(WriteCollectionStage::new(RecordKind::Script, Scope::Content, |d| &d.scripts));
    op.append_stage(WriteCollectionStage::new(RecordKind::Region, Scope::Content, |d| &d.regions));
    op.append_stage(WriteCollectionStage::new(RecordKind::Birthsign, Scope::Content, |d| {
        &d.birthsigns
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::Spell, Scope::Content, |d| &d.spells));
    op.append_stage(WriteCollectionStage::new(RecordKind::Enchantment, Scope::Content, |d| {
        &d.enchantments
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::BodyPart, Scope::Content, |d| {
        &d.body_parts
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::MagicEffect, Scope::Content, |d| {
        &d.magic_effects
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::StartScript, Scope::Content, |d| {
        &d.start_scripts
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::Referenceable, Scope::Content, |d| {
        &d.referenceables
    }));
    // Sound generators must follow the creatures they refer to.
    op.append_stage(WriteCollectionStage::new(RecordKind::SoundGen, Scope::Content, |d| {
        &d.sound_gens
    }));
    op.append_stage(CollectionReferencesStage);
    op.append_stage(SortCollatedReferencesStage);
    op.append_stage(WriteCellCollectionStage::new());
    op.append_stage(WriteDialogueCollectionStage);
    op.append_stage(WriteCollectionStage::new(RecordKind::Pathgrid, Scope::Content, |d| {
        &d.pathgrids
    }));
    op.append_stage(WriteCollectionStage::new(RecordKind::LandTexture, Scope::Content, |d| {
        &d.land_textures
    }));
    op.append_stage(WriteLandCollectionStage);
    op.append_stage(CloseSaveStage);

    op.append_stage(FinalSavingStage);
    Ok(op)
}
