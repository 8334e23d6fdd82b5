use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::codec::{RawRecord, RecordKind, RecordReader};
use crate::error::DocumentError;
use crate::messages::{Messages, Severity};

use super::collection::{Collection, Scope};
use super::types::{Cell, CellRef, Dialogue, GenericRecord, Info, Land, LandTexture};

/// File currently being read by `continue_loading`.
struct LoadingFile {
    path: PathBuf,
    reader: RecordReader<BufReader<File>>,
    base: bool,
}

/// All record collections of a document.
#[derive(Default)]
pub struct Data {
    pub filters: Collection<GenericRecord>,
    pub debug_profiles: Collection<GenericRecord>,
    pub scripts: Collection<GenericRecord>,
    pub selection_groups: Collection<GenericRecord>,
    pub globals: Collection<GenericRecord>,
    pub game_settings: Collection<GenericRecord>,
    pub skills: Collection<GenericRecord>,
    pub classes: Collection<GenericRecord>,
    pub factions: Collection<GenericRecord>,
    pub races: Collection<GenericRecord>,
    pub sounds: Collection<GenericRecord>,
    pub regions: Collection<GenericRecord>,
    pub birthsigns: Collection<GenericRecord>,
    pub spells: Collection<GenericRecord>,
    pub enchantments: Collection<GenericRecord>,
    pub body_parts: Collection<GenericRecord>,
    pub magic_effects: Collection<GenericRecord>,
    pub start_scripts: Collection<GenericRecord>,
    pub referenceables: Collection<GenericRecord>,
    pub sound_gens: Collection<GenericRecord>,
    pub cells: Collection<Cell>,
    pub references: Collection<CellRef>,
    pub topics: Collection<Dialogue>,
    pub infos: Collection<Info>,
    pub pathgrids: Collection<GenericRecord>,
    pub land_textures: Collection<LandTexture>,
    pub land: Collection<Land>,
    loading: Option<LoadingFile>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("cells", &self.cells.len())
            .field("references", &self.references.len())
            .field("topics", &self.topics.len())
            .field("infos", &self.infos.len())
            .field("loading", &self.loading.as_ref().map(|l| l.path.clone()))
            .finish()
    }
}

fn apply<T: DeserializeOwned + Clone>(
    collection: &mut Collection<T>,
    record: RawRecord,
    base: bool,
    messages: &mut Messages,
) -> Result<(), DocumentError> {
    if record.deleted {
        if !collection.load_deleted(&record.id, base) {
            messages.add_with_severity(
                &record.id,
                format!("Deleting unknown {} record", record.kind),
                "",
                Severity::Warning,
            );
        }
        return Ok(());
    }
    let value = decode(&record)?;
    collection.load(&record.id, value, base);
    Ok(())
}

fn decode<T: DeserializeOwned>(record: &RawRecord) -> Result<T, DocumentError> {
    serde_json::from_value(record.body.clone()).map_err(|e| DocumentError::Decode {
        kind: record.kind.to_string(),
        id: record.id.clone(),
        source: e,
    })
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for incremental loading and returns its record count.
    ///
    /// Records of base files become base records; the edited content file and
    /// the project file layer modifications on top.
    pub fn start_loading(
        &mut self,
        path: &Path,
        base: bool,
        project: bool,
    ) -> Result<usize, DocumentError> {
        let reader = RecordReader::open(path).map_err(|e| DocumentError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        let steps = reader.header().record_count;
        debug!(
            "Loading {} ({} records, base: {}, project: {})",
            path.display(),
            steps,
            base,
            project
        );
        self.loading = Some(LoadingFile {
            path: path.to_path_buf(),
            reader,
            base: base && !project,
        });
        Ok(steps)
    }

    /// Applies one record of the current file. Returns true once the file is
    /// exhausted (or when nothing is being loaded).
    pub fn continue_loading(&mut self, messages: &mut Messages) -> Result<bool, DocumentError> {
        let Some(loading) = self.loading.as_mut() else {
            return Ok(true);
        };
        let base = loading.base;
        let record = match loading.reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.loading = None;
                return Ok(true);
            }
            Err(e) => {
                let path = loading.path.clone();
                self.loading = None;
                return Err(DocumentError::Load { path, source: e });
            }
        };

        if Scope::of(&record.id) == Scope::Session {
            messages.add_with_severity(
                &record.id,
                "Session records are never loaded from files",
                "",
                Severity::Warning,
            );
            return Ok(false);
        }

        self.apply_record(record, base, messages)?;
        Ok(false)
    }

    pub fn finish_loading(&mut self) {
        self.loading = None;
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    fn apply_record(
        &mut self,
        record: RawRecord,
        base: bool,
        messages: &mut Messages,
    ) -> Result<(), DocumentError> {
        match record.kind {
            RecordKind::Filter => apply(&mut self.filters, record, base, messages),
            RecordKind::DebugProfile => apply(&mut self.debug_profiles, record, base, messages),
            RecordKind::Script => apply(&mut self.scripts, record, base, messages),
            RecordKind::SelectionGroup => {
                apply(&mut self.selection_groups, record, base, messages)
            }
            RecordKind::Global => apply(&mut self.globals, record, base, messages),
            RecordKind::GameSetting => apply(&mut self.game_settings, record, base, messages),
            RecordKind::Skill => apply(&mut self.skills, record, base, messages),
            RecordKind::Class => apply(&mut self.classes, record, base, messages),
            RecordKind::Faction => apply(&mut self.factions, record, base, messages),
            RecordKind::Race => apply(&mut self.races, record, base, messages),
            RecordKind::Sound => apply(&mut self.sounds, record, base, messages),
            RecordKind::Region => apply(&mut self.regions, record, base, messages),
            RecordKind::Birthsign => apply(&mut self.birthsigns, record, base, messages),
            RecordKind::Spell => apply(&mut self.spells, record, base, messages),
            RecordKind::Enchantment => apply(&mut self.enchantments, record, base, messages),
            RecordKind::BodyPart => apply(&mut self.body_parts, record, base, messages),
            RecordKind::MagicEffect => apply(&mut self.magic_effects, record, base, messages),
            RecordKind::StartScript => apply(&mut self.start_scripts, record, base, messages),
            RecordKind::Referenceable => apply(&mut self.referenceables, record, base, messages),
            RecordKind::SoundGen => apply(&mut self.sound_gens, record, base, messages),
            RecordKind::Cell => apply(&mut self.cells, record, base, messages),
            RecordKind::CellRef => self.apply_reference(record, base, messages),
            RecordKind::Dialogue => apply(&mut self.topics, record, base, messages),
            RecordKind::Info => apply(&mut self.infos, record, base, messages),
            RecordKind::Pathgrid => apply(&mut self.pathgrids, record, base, messages),
            RecordKind::LandTexture => apply(&mut self.land_textures, record, base, messages),
            RecordKind::Land => apply(&mut self.land, record, base, messages),
        }
    }

    fn apply_reference(
        &mut self,
        record: RawRecord,
        base: bool,
        messages: &mut Messages,
    ) -> Result<(), DocumentError> {
        if record.deleted {
            return apply(&mut self.references, record, base, messages);
        }
        let mut reference: CellRef = decode(&record)?;
        // A reference read from disk resides where the file put it.
        reference.original_cell = reference.cell.clone();
        self.references.load(&record.id, reference, base);
        Ok(())
    }

    /// Dirty content-scope records across every collection the content file
    /// carries.
    pub fn count_content_records(&self) -> usize {
        let scope = Scope::Content;
        [
            self.globals.count_dirty_in(scope),
            self.game_settings.count_dirty_in(scope),
            self.skills.count_dirty_in(scope),
            self.classes.count_dirty_in(scope),
            self.factions.count_dirty_in(scope),
            self.races.count_dirty_in(scope),
            self.sounds.count_dirty_in(scope),
            self.scripts.count_dirty_in(scope),
            self.regions.count_dirty_in(scope),
            self.birthsigns.count_dirty_in(scope),
            self.spells.count_dirty_in(scope),
            self.enchantments.count_dirty_in(scope),
            self.body_parts.count_dirty_in(scope),
            self.magic_effects.count_dirty_in(scope),
            self.start_scripts.count_dirty_in(scope),
            self.referenceables.count_dirty_in(scope),
            self.sound_gens.count_dirty_in(scope),
            self.cells.count_dirty_in(scope),
            self.references.count_dirty_in(scope),
            self.topics.count_dirty_in(scope),
            self.infos.count_dirty_in(scope),
            self.pathgrids.count_dirty_in(scope),
            self.land_textures.count_dirty_in(scope),
            self.land.count_dirty_in(scope),
        ]
        .iter()
        .sum()
    }

    pub fn count_project_records(&self) -> usize {
        let scope = Scope::Project;
        self.filters.count_dirty_in(scope)
            + self.debug_profiles.count_dirty_in(scope)
            + self.scripts.count_dirty_in(scope)
            + self.selection_groups.count_dirty_in(scope)
    }

    /// Indices of the infos belonging to `topic`, in collection order.
    pub fn topic_infos(&self, topic: &str) -> Vec<usize> {
        self.infos
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get().topic.eq_ignore_ascii_case(topic))
            .map(|(i, _)| i)
            .collect()
    }
}
