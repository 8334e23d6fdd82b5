use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::codec::RecordKind;
use crate::document::{Document, SharedDocument};
use crate::operation::{Operation, OperationKind, OperationReporter, OperationState};

use super::land::{PopulateLandTexturesStage, PurgeLandTexturesStage};
use super::stages::{FinishMergedDocumentStage, MergeCollectionStage, MergeReferencesStage};
use super::state::MergeState;

/// Merges `sources` into a new document.
///
/// On success the merged document is sent to the receiver returned by
/// [`MergeOperation::merged`]; on failure it is dropped with the operation.
pub struct MergeOperation {
    operation: Operation<MergeState>,
    merged_tx: Sender<Document>,
    merged_rx: Receiver<Document>,
}

impl MergeOperation {
    pub fn new(sources: Vec<SharedDocument>, target: Document) -> Self {
        let mut op = Operation::new(
            OperationKind::Merge,
            true,
            false,
            MergeState::new(sources, target),
        );

        op.append_stage(MergeCollectionStage::new(RecordKind::Global, |d| &d.globals, |d| &mut d.globals));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::GameSetting,
            |d| &d.game_settings,
            |d| &mut d.game_settings,
        ));
        op.append_stage(MergeCollectionStage::new(RecordKind::Skill, |d| &d.skills, |d| &mut d.skills));
        op.append_stage(MergeCollectionStage::new(RecordKind::Class, |d| &d.classes, |d| &mut d.classes));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::Faction,
            |d| &d.factions,
            |d| &mut d.factions,
        ));
        op.append_stage(MergeCollectionStage::new(RecordKind::Race, |d| &d.races, |d| &mut d.races));
        op.append_stage(MergeCollectionStage::new(RecordKind::Sound, |d| &d.sounds, |d| &mut d.sounds));
        op.append_stage(MergeCollectionStage::new(RecordKind::Script, |d| &d.scripts, |d| &mut d.scripts));
        op.append_stage(MergeCollectionStage::new(RecordKind::Region, |d| &d.regions, |d| &mut d.regions));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::Birthsign,
            |d| &d.birthsigns,
            |d| &mut d.birthsigns,
        ));
        op.append_stage(MergeCollectionStage::new(RecordKind::Spell, |d| &d.spells, |d| &mut d.spells));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::Enchantment,
            |d| &d.enchantments,
            |d| &mut d.enchantments,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::BodyPart,
            |d| &d.body_parts,
            |d| &mut d.body_parts,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::MagicEffect,
            |d| &d.magic_effects,
            |d| &mut d.magic_effects,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::StartScript,
            |d| &d.start_scripts,
            |d| &mut d.start_scripts,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::Referenceable,
            |d| &d.referenceables,
            |d| &mut d.referenceables,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::SoundGen,
            |d| &d.sound_gens,
            |d| &mut d.sound_gens,
        ));
        op.append_stage(MergeCollectionStage::new(RecordKind::Cell, |d| &d.cells, |d| &mut d.cells));
        op.append_stage(MergeReferencesStage::new());
        op.append_stage(MergeCollectionStage::new(RecordKind::Dialogue, |d| &d.topics, |d| &mut d.topics));
        op.append_stage(MergeCollectionStage::new(RecordKind::Info, |d| &d.infos, |d| &mut d.infos));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::Pathgrid,
            |d| &d.pathgrids,
            |d| &mut d.pathgrids,
        ));
        op.append_stage(MergeCollectionStage::new(
            RecordKind::LandTexture,
            |d| &d.land_textures,
            |d| &mut d.land_textures,
        ));
        op.append_stage(MergeCollectionStage::new(RecordKind::Land, |d| &d.land, |d| &mut d.land));
        op.append_stage(PopulateLandTexturesStage);
        op.append_stage(PurgeLandTexturesStage);
        op.append_stage(FinishMergedDocumentStage);

        let (merged_tx, merged_rx) = unbounded();
        Self {
            operation: op,
            merged_tx,
            merged_rx,
        }
    }

    /// Receives the merged document once the merge succeeds.
    pub fn merged(&self) -> Receiver<Document> {
        self.merged_rx.clone()
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn OperationReporter>) {
        self.operation.add_reporter(reporter);
    }

    pub fn operation(&self) -> &Operation<MergeState> {
        &self.operation
    }

    pub fn run(&mut self) {
        self.operation.run();
    }

    /// One tick; hands the target off when this tick completes the merge.
    pub fn step(&mut self) -> bool {
        let was_active = self.operation.is_active();
        let active = self.operation.step();
        if was_active && !active {
            self.operation_done();
        }
        active
    }

    pub fn abort(&mut self) {
        self.operation.abort();
    }

    /// Runs until done. Returns true if the merged document was handed off.
    pub fn run_to_completion(&mut self) -> bool {
        self.run();
        while self.step() {}
        self.operation.state() == OperationState::Done && !self.operation.has_error()
    }

    fn operation_done(&mut self) {
        if self.operation.state() != OperationState::Done || self.operation.has_error() {
            warn!("Merge failed, discarding merged document");
            return;
        }
        match self.operation.context_mut().take_target() {
            Some(document) => {
                info!("Merge complete");
                // Receiver is held by `self`, so this cannot fail.
                let _ = self.merged_tx.send(document);
            }
            None => warn!("Merge finished without completing the target"),
        }
    }
}
