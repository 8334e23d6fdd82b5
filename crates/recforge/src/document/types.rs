use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Record without structure the pipelines care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericRecord {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl GenericRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interior: bool,
    #[serde(default)]
    pub grid: Option<(i32, i32)>,
    /// Next reference number handed out inside this cell.
    #[serde(default)]
    pub ref_num_counter: u32,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Cell {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Parses exterior cell ids of the form `#x y`.
pub fn parse_exterior_id(id: &str) -> Option<(i32, i32)> {
    let rest = id.strip_prefix('#')?;
    let mut parts = rest.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y))
}

pub fn exterior_id(x: i32, y: i32) -> String {
    format!("#{} {}", x, y)
}

/// A placed instance of a referenceable inside a cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRef {
    pub cell: String,
    /// Cell the reference was loaded in; differs from `cell` after a move.
    #[serde(default)]
    pub original_cell: String,
    /// `None` for references that were never saved.
    #[serde(default)]
    pub ref_num: Option<u32>,
    pub object: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl CellRef {
    pub fn new(cell: &str, object: &str) -> Self {
        Self {
            cell: cell.to_string(),
            original_cell: cell.to_string(),
            ref_num: None,
            object: object.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn is_moved(&self) -> bool {
        !self.original_cell.is_empty() && !self.original_cell.eq_ignore_ascii_case(&self.cell)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueKind {
    #[default]
    Topic,
    Voice,
    Greeting,
    Persuasion,
    Journal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    #[serde(default)]
    pub kind: DialogueKind,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Dialogue {
    pub fn new(kind: DialogueKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }
}

/// A response belonging to a topic; infos of a topic form a linked list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub topic: String,
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub next: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Info {
    pub fn new(topic: &str, text: &str) -> Self {
        Self {
            topic: topic.to_string(),
            text: text.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandTexture {
    pub texture: String,
}

/// Terrain of one exterior cell; `textures` holds land texture ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Land {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub textures: Vec<String>,
}
