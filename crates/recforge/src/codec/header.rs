use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version written into every header.
pub const FORMAT_VERSION: u32 = 1;

/// Kind tag of a record line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Filter,
    DebugProfile,
    Script,
    SelectionGroup,
    Global,
    GameSetting,
    Skill,
    Class,
    Faction,
    Race,
    Sound,
    Region,
    Birthsign,
    Spell,
    Enchantment,
    BodyPart,
    MagicEffect,
    StartScript,
    Referenceable,
    SoundGen,
    Cell,
    CellRef,
    Dialogue,
    Info,
    Pathgrid,
    LandTexture,
    Land,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Filter => "filter",
            RecordKind::DebugProfile => "debug_profile",
            RecordKind::Script => "script",
            RecordKind::SelectionGroup => "selection_group",
            RecordKind::Global => "global",
            RecordKind::GameSetting => "game_setting",
            RecordKind::Skill => "skill",
            RecordKind::Class => "class",
            RecordKind::Faction => "faction",
            RecordKind::Race => "race",
            RecordKind::Sound => "sound",
            RecordKind::Region => "region",
            RecordKind::Birthsign => "birthsign",
            RecordKind::Spell => "spell",
            RecordKind::Enchantment => "enchantment",
            RecordKind::BodyPart => "body_part",
            RecordKind::MagicEffect => "magic_effect",
            RecordKind::StartScript => "start_script",
            RecordKind::Referenceable => "referenceable",
            RecordKind::SoundGen => "sound_gen",
            RecordKind::Cell => "cell",
            RecordKind::CellRef => "cell_ref",
            RecordKind::Dialogue => "dialogue",
            RecordKind::Info => "info",
            RecordKind::Pathgrid => "pathgrid",
            RecordKind::LandTexture => "land_texture",
            RecordKind::Land => "land",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency of a content file, with its byte size at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Master {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub format: u32,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Number of modified, added and deleted records the file carries.
    pub record_count: usize,
    #[serde(default)]
    pub masters: Vec<Master>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub project: bool,
}

impl Header {
    pub fn new(author: &str, description: &str, record_count: usize, project: bool) -> Self {
        Self {
            format: FORMAT_VERSION,
            author: author.to_string(),
            description: description.to_string(),
            record_count,
            masters: Vec::new(),
            saved_at: Utc::now(),
            project,
        }
    }
}
