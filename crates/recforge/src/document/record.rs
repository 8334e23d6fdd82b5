use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Unchanged record from a base content file.
    BaseOnly,
    /// Base record with local modifications.
    Modified,
    /// Record that only exists in the edited file.
    ModifiedOnly,
    Deleted,
}

/// A record with its live value and, once modified, the base snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    pub id: String,
    value: T,
    base: Option<T>,
    state: RecordState,
}

impl<T: Clone> Record<T> {
    pub fn base(id: &str, value: T) -> Self {
        Self {
            id: id.to_string(),
            value,
            base: None,
            state: RecordState::BaseOnly,
        }
    }

    pub fn added(id: &str, value: T) -> Self {
        Self {
            id: id.to_string(),
            value,
            base: None,
            state: RecordState::ModifiedOnly,
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Current value. Deleted records expose their base snapshot.
    pub fn get(&self) -> &T {
        match self.state {
            RecordState::Deleted => self.base_value(),
            _ => &self.value,
        }
    }

    /// Value as it was in the base files (or the live value if never modified).
    pub fn base_value(&self) -> &T {
        self.base.as_ref().unwrap_or(&self.value)
    }

    pub fn has_base(&self) -> bool {
        matches!(self.state, RecordState::BaseOnly) || self.base.is_some()
    }

    pub fn is_modified(&self) -> bool {
        matches!(self.state, RecordState::Modified | RecordState::ModifiedOnly)
    }

    pub fn is_deleted(&self) -> bool {
        self.state == RecordState::Deleted
    }

    /// Modified, added or deleted; i.e. something a save has to write.
    pub fn is_dirty(&self) -> bool {
        self.state != RecordState::BaseOnly
    }

    pub fn set_modified(&mut self, value: T) {
        match self.state {
            RecordState::BaseOnly => {
                let old = std::mem::replace(&mut self.value, value);
                self.base = Some(old);
                self.state = RecordState::Modified;
            }
            RecordState::Modified | RecordState::ModifiedOnly => {
                self.value = value;
            }
            RecordState::Deleted => {
                self.value = value;
                self.state = if self.base.is_some() {
                    RecordState::Modified
                } else {
                    RecordState::ModifiedOnly
                };
            }
        }
    }

    /// Replaces the base snapshot, keeping local modifications on top.
    pub fn set_base(&mut self, value: T) {
        match self.state {
            RecordState::BaseOnly => self.value = value,
            _ => self.base = Some(value),
        }
    }

    pub fn set_deleted(&mut self) {
        if self.state == RecordState::BaseOnly {
            self.base = Some(self.value.clone());
        }
        self.state = RecordState::Deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifying_base_record_keeps_snapshot() {
        let mut record = Record::base("gamehour", 1);
        record.set_modified(5);

        assert_eq!(record.state(), RecordState::Modified);
        assert_eq!(*record.get(), 5);
        assert_eq!(*record.base_value(), 1);
    }

    #[test]
    fn test_deleted_record_exposes_base() {
        let mut record = Record::base("gamehour", 1);
        record.set_modified(2);
        record.set_deleted();

        assert!(record.is_deleted());
        assert_eq!(*record.get(), 1);
    }

    #[test]
    fn test_undeleting_added_record_stays_added() {
        let mut record = Record::added("new", 1);
        record.set_deleted();
        record.set_modified(3);

        assert_eq!(record.state(), RecordState::ModifiedOnly);
        assert_eq!(*record.get(), 3);
    }

    #[test]
    fn test_base_only_is_not_dirty() {
        let record = Record::base("x", 0);
        assert!(!record.is_dirty());
        assert!(record.has_base());
        assert!(!Record::added("y", 0).has_base());
    }
}
