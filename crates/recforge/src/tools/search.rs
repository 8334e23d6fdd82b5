use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::codec::RecordKind;
use crate::document::{
    read_document, Cell, CellRef, Collection, Data, Dialogue, GenericRecord, Info, Land,
    LandTexture, SharedDocument,
};
use crate::error::{ConfigError, StageError, WorkerError};
use crate::messages::{Messages, Severity};
use crate::operation::{Operation, OperationKind, Stage, UserSettings, WorkerOperation};

use super::ScanContext;

pub const CHAR_BEFORE_SETTING: &str = "search/char-before";
pub const CHAR_AFTER_SETTING: &str = "search/char-after";
const DEFAULT_PADDING: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Text,
    Regex,
}

/// A case-insensitive search over record text.
#[derive(Debug, Clone)]
pub struct Search {
    mode: SearchMode,
    pattern: String,
    regex: Regex,
}

impl Search {
    pub fn text(value: &str) -> Result<Self, ConfigError> {
        Self::build(SearchMode::Text, value, &regex::escape(value))
    }

    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        Self::build(SearchMode::Regex, pattern, pattern)
    }

    fn build(mode: SearchMode, pattern: &str, expression: &str) -> Result<Self, ConfigError> {
        if pattern.is_empty() {
            return Err(ConfigError::Validation {
                message: "Search pattern must not be empty".to_string(),
            });
        }
        let regex = RegexBuilder::new(expression)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Validation {
                message: format!("Invalid search pattern '{}': {}", pattern, e),
            })?;
        Ok(Self {
            mode,
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Byte ranges of all non-empty matches in `text`.
    pub fn matches(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(text)
            .filter(|m| !m.is_empty())
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

/// Text fields a search looks at, as `(field, text)` pairs.
pub trait Searchable {
    fn search_fields(&self) -> Vec<(&str, &str)>;
}

fn map_fields(fields: &std::collections::BTreeMap<String, String>) -> Vec<(&str, &str)> {
    fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

impl Searchable for GenericRecord {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        map_fields(&self.fields)
    }
}

impl Searchable for Cell {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![("name", self.name.as_str())];
        fields.extend(map_fields(&self.fields));
        fields
    }
}

impl Searchable for CellRef {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![("object", self.object.as_str())];
        fields.extend(map_fields(&self.fields));
        fields
    }
}

impl Searchable for Dialogue {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        map_fields(&self.fields)
    }
}

impl Searchable for Info {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![("text", self.text.as_str())];
        fields.extend(map_fields(&self.fields));
        fields
    }
}

impl Searchable for LandTexture {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        vec![("texture", self.texture.as_str())]
    }
}

impl Searchable for Land {
    fn search_fields(&self) -> Vec<(&str, &str)> {
        self.textures.iter().map(|t| ("textures", t.as_str())).collect()
    }
}

/// `text[start..end]` padded by up to `before`/`after` characters.
fn snippet(text: &str, start: usize, end: usize, before: usize, after: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(before)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let to = text[end..]
        .char_indices()
        .nth(after)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    text[from..to].to_string()
}

fn padding(values: &[String], name: &str) -> Option<usize> {
    let value = values.first()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring invalid value '{}' for {}", value, name);
            None
        }
    }
}

/// Searches one collection; one record per step, one Info message per hit
/// with hint `field:offset:length`.
pub struct SearchStage<T> {
    kind: RecordKind,
    accessor: fn(&Data) -> &Collection<T>,
    search: Search,
    before: usize,
    after: usize,
}

impl<T> SearchStage<T> {
    pub fn new(kind: RecordKind, accessor: fn(&Data) -> &Collection<T>, search: Search) -> Self {
        Self {
            kind,
            accessor,
            search,
            before: DEFAULT_PADDING,
            after: DEFAULT_PADDING,
        }
    }
}

impl<T: Clone + Searchable + 'static> Stage<ScanContext> for SearchStage<T> {
    fn setup(&mut self, context: &mut ScanContext) -> Result<usize, StageError> {
        let doc = read_document(&context.document)?;
        Ok((self.accessor)(&doc.data).len())
    }

    fn perform(
        &mut self,
        step: usize,
        context: &mut ScanContext,
        messages: &mut Messages,
    ) -> Result<(), StageError> {
        let doc = read_document(&context.document)?;
        let Some(record) = (self.accessor)(&doc.data).get(step) else {
            return Ok(());
        };
        if record.is_deleted() {
            return Ok(());
        }

        let mut fields = vec![("id", record.id.as_str())];
        fields.extend(record.get().search_fields());
        for (field, text) in fields {
            for (start, end) in self.search.matches(text) {
                messages.add_with_severity(
                    &record.id,
                    format!(
                        "{}: {}",
                        self.kind,
                        snippet(text, start, end, self.before, self.after)
                    ),
                    format!("{}:{}:{}", field, start, end - start),
                    Severity::Info,
                );
            }
        }
        Ok(())
    }

    fn update_user_setting(&mut self, name: &str, values: &[String]) {
        match name {
            CHAR_BEFORE_SETTING => {
                if let Some(n) = padding(values, name) {
                    self.before = n;
                }
            }
            CHAR_AFTER_SETTING => {
                if let Some(n) = padding(values, name) {
                    self.after = n;
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

/// Builds a search spanning every searchable collection of `document`.
pub fn search_operation(
    document: SharedDocument,
    search: Search,
    settings: UserSettings,
) -> Operation<ScanContext> {
    let mut op = Operation::new(OperationKind::Search, false, false, ScanContext { document });
    op.set_default_severity(Severity::Info);
    op.configure_settings(settings);

    let generic: [(RecordKind, fn(&Data) -> &Collection<GenericRecord>); 21] = [
        (RecordKind::Filter, |d| &d.filters),
        (RecordKind::DebugProfile, |d| &d.debug_profiles),
        (RecordKind::Script, |d| &d.scripts),
        (RecordKind::SelectionGroup, |d| &d.selection_groups),
        (RecordKind::Global, |d| &d.globals),
        (RecordKind::GameSetting, |d| &d.game_settings),
        (RecordKind::Skill, |d| &d.skills),
        (RecordKind::Class, |d| &d.classes),
        (RecordKind::Faction, |d| &d.factions),
        (RecordKind::Race, |d| &d.races),
        (RecordKind::Sound, |d| &d.sounds),
        (RecordKind::Region, |d| &d.regions),
        (RecordKind::Birthsign, |d| &d.birthsigns),
        (RecordKind::Spell, |d| &d.spells),
        (RecordKind::Enchantment, |d| &d.enchantments),
        (RecordKind::BodyPart, |d| &d.body_parts),
        (RecordKind::MagicEffect, |d| &d.magic_effects),
        (RecordKind::StartScript, |d| &d.start_scripts),
        (RecordKind::Referenceable, |d| &d.referenceables),
        (RecordKind::SoundGen, |d| &d.sound_gens),
        (RecordKind::Pathgrid, |d| &d.pathgrids),
    ];
    for (kind, accessor) in generic {
        op.append_stage(SearchStage::new(kind, accessor, search.clone()));
    }
    op.append_stage(SearchStage::new(RecordKind::Cell, |d| &d.cells, search.clone()));
    op.append_stage(SearchStage::new(RecordKind::CellRef, |d| &d.references, search.clone()));
    op.append_stage(SearchStage::new(RecordKind::Dialogue, |d| &d.topics, search.clone()));
    op.append_stage(SearchStage::new(RecordKind::Info, |d| &d.infos, search.clone()));
    op.append_stage(SearchStage::new(RecordKind::LandTexture, |d| &d.land_textures, search.clone()));
    op.append_stage(SearchStage::new(RecordKind::Land, |d| &d.land, search));
    op
}

/// Runs a search on its own thread.
pub fn spawn_search(
    document: SharedDocument,
    search: Search,
    settings: UserSettings,
) -> Result<WorkerOperation<ScanContext>, WorkerError> {
    WorkerOperation::spawn(search_operation(document, search, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::messages::Message;
    use crate::operation::OperationEvent;
    use std::path::PathBuf;

    fn hits(op: &mut Operation<ScanContext>) -> Vec<Message> {
        let (tx, rx) = crossbeam_channel::unbounded();
        op.add_reporter(Box::new(crate::operation::ChannelReporter::new(tx)));
        assert!(op.run_to_completion());
        rx.try_iter()
            .filter_map(|e| match e {
                OperationEvent::Message { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn document() -> SharedDocument {
        let mut document = Document::new(vec![], PathBuf::new(), true);
        let data = document.edit();
        data.infos.modify(
            "greet1",
            Info::new("greeting", "Welcome to Balmora, outlander. Balmora is hot."),
        );
        data.cells.modify("Balmora", Cell::named("Balmora, Council Club"));
        data.globals.load("unrelated", GenericRecord::new().with("value", "1"), true);
        document.into_shared()
    }

    #[test]
    fn test_text_search_is_case_insensitive_across_collections() {
        let search = Search::text("balmora").unwrap();
        let mut op = search_operation(document(), search, UserSettings::new());

        let messages = hits(&mut op);

        let hints: Vec<&str> = messages.iter().map(|m| m.hint.as_str()).collect();
        assert_eq!(hints, vec!["id:0:7", "name:0:7", "text:11:7", "text:31:7"]);
        assert!(messages.iter().all(|m| m.severity == Severity::Info));
    }

    #[test]
    fn test_snippet_padding_follows_settings() {
        let mut settings = UserSettings::new();
        settings.insert(CHAR_BEFORE_SETTING.to_string(), vec!["3".to_string()]);
        settings.insert(CHAR_AFTER_SETTING.to_string(), vec!["0".to_string()]);
        let search = Search::regex(r"out\w+").unwrap();
        let mut op = search_operation(document(), search, settings);

        let messages = hits(&mut op);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "info: a, outlander");
        assert_eq!(messages[0].subject.as_deref(), Some("greet1"));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        assert!(Search::regex("(unclosed").is_err());
        assert!(Search::text("").is_err());
        assert_eq!(Search::text("a.b").unwrap().matches("axb a.b"), vec![(4, 7)]);
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = "ééé word ééé";
        let start = text.find("word").unwrap();
        assert_eq!(snippet(text, start, start + 4, 2, 2), "é word é");
    }
}
