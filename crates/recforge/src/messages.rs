//! Severity-tagged diagnostics produced by stages and the loader.

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    SeriousError,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "Information"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
            Severity::SeriousError => write!(f, "Serious Error"),
        }
    }
}

/// A single diagnostic. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Id of the record the message is about, if any.
    pub subject: Option<String>,
    pub text: String,
    /// Free-form locator for the report sink (e.g. `field:offset:length`).
    pub hint: String,
    pub severity: Severity,
}

impl Message {
    pub fn new(
        subject: Option<&str>,
        text: impl Into<String>,
        hint: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            subject: subject.map(|s| s.to_string()),
            text: text.into(),
            hint: hint.into(),
            severity,
        }
    }
}

/// Ordered collection of messages produced during one step.
#[derive(Debug, Clone)]
pub struct Messages {
    messages: Vec<Message>,
    default_severity: Severity,
}

impl Messages {
    pub fn new(default_severity: Severity) -> Self {
        Self {
            messages: Vec::new(),
            default_severity,
        }
    }

    /// Adds a message with the collection's default severity.
    pub fn add(&mut self, subject: &str, text: impl Into<String>, hint: impl Into<String>) {
        let severity = self.default_severity;
        self.add_with_severity(subject, text, hint, severity);
    }

    pub fn add_with_severity(
        &mut self,
        subject: &str,
        text: impl Into<String>,
        hint: impl Into<String>,
        severity: Severity,
    ) {
        self.messages
            .push(Message::new(Some(subject), text, hint, severity));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn default_severity(&self) -> Severity {
        self.default_severity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::new(Severity::Warning)
    }
}

impl IntoIterator for Messages {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_uses_default_severity() {
        let mut messages = Messages::new(Severity::Error);
        messages.add("gold_001", "Missing icon", "");

        let message = messages.iter().next().unwrap();
        assert_eq!(message.severity, Severity::Error);
        assert_eq!(message.subject.as_deref(), Some("gold_001"));
    }

    #[test]
    fn test_explicit_severity_overrides_default() {
        let mut messages = Messages::default();
        messages.add_with_severity("x", "broken", "", Severity::SeriousError);
        messages.add("y", "odd", "");

        let severities: Vec<Severity> = messages.iter().map(|m| m.severity).collect();
        assert_eq!(severities, vec![Severity::SeriousError, Severity::Warning]);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let mut messages = Messages::default();
        for i in 0..5 {
            messages.add(&format!("id{}", i), "text", "");
        }
        let subjects: Vec<String> = messages
            .into_iter()
            .map(|m| m.subject.unwrap())
            .collect();
        assert_eq!(subjects, vec!["id0", "id1", "id2", "id3", "id4"]);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::SeriousError);
        assert_eq!(Severity::SeriousError.to_string(), "Serious Error");
    }
}
