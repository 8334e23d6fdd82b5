use std::collections::HashMap;

use super::record::{Record, RecordState};

/// Where a record is persisted, derived from its id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Content,
    Project,
    Session,
}

impl Scope {
    pub fn of(id: &str) -> Self {
        let lower = id.to_ascii_lowercase();
        if lower.starts_with("project::") {
            Scope::Project
        } else if lower.starts_with("session::") {
            Scope::Session
        } else {
            Scope::Content
        }
    }
}

/// Insertion-ordered records with a case-insensitive id index.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    records: Vec<Record<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }
}

fn key(id: &str) -> String {
    id.to_ascii_lowercase()
}

impl<T: Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record<T>> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<T>> {
        self.records.iter()
    }

    pub fn search_id(&self, id: &str) -> Option<usize> {
        self.index.get(&key(id)).copied()
    }

    pub fn record(&self, id: &str) -> Option<&Record<T>> {
        self.search_id(id).map(|i| &self.records[i])
    }

    pub fn record_mut(&mut self, id: &str) -> Option<&mut Record<T>> {
        match self.search_id(id) {
            Some(i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// True if the record exists and is not deleted.
    pub fn contains_live(&self, id: &str) -> bool {
        self.record(id).map(|r| !r.is_deleted()).unwrap_or(false)
    }

    fn push(&mut self, record: Record<T>) {
        self.index.insert(key(&record.id), self.records.len());
        self.records.push(record);
    }

    /// Applies a record read from a file. Base files replace the base value,
    /// the edited file layers modifications on top.
    pub fn load(&mut self, id: &str, value: T, base: bool) {
        match (self.search_id(id), base) {
            (Some(i), true) => self.records[i].set_base(value),
            (Some(i), false) => self.records[i].set_modified(value),
            (None, true) => self.push(Record::base(id, value)),
            (None, false) => self.push(Record::added(id, value)),
        }
    }

    /// Applies a deletion read from a file. Returns false if the id is unknown.
    pub fn load_deleted(&mut self, id: &str, base: bool) -> bool {
        if self.search_id(id).is_none() {
            return false;
        }
        if base {
            self.erase(id);
        } else if let Some(record) = self.record_mut(id) {
            record.set_deleted();
        }
        true
    }

    /// Sets a new value, appending an added record if the id is new.
    pub fn modify(&mut self, id: &str, value: T) {
        match self.search_id(id) {
            Some(i) => self.records[i].set_modified(value),
            None => self.push(Record::added(id, value)),
        }
    }

    /// Marks a record deleted. Records that never had a base are erased.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(i) = self.search_id(id) else {
            return false;
        };
        if self.records[i].has_base() {
            self.records[i].set_deleted();
        } else {
            self.erase(id);
        }
        true
    }

    /// Takes over a value from another document as an added record,
    /// replacing whatever the id held before.
    pub fn merge_in(&mut self, id: &str, value: T) {
        match self.search_id(id) {
            Some(i) => self.records[i] = Record::added(id, value),
            None => self.push(Record::added(id, value)),
        }
    }

    pub fn erase(&mut self, id: &str) -> Option<Record<T>> {
        let i = self.index.remove(&key(id))?;
        let record = self.records.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(record)
    }

    pub fn count(&self, states: &[RecordState]) -> usize {
        self.records
            .iter()
            .filter(|r| states.contains(&r.state()))
            .count()
    }

    /// Dirty records whose id falls into `scope`.
    pub fn count_dirty_in(&self, scope: Scope) -> usize {
        self.records
            .iter()
            .filter(|r| r.is_dirty() && Scope::of(&r.id) == scope)
            .count()
    }
}
