use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::operation::UserSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub version: String,
    /// Author written into saved file headers.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Buffer size of the loader's event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Per-stage settings keyed `section/name`.
    #[serde(default)]
    pub user_settings: BTreeMap<String, Vec<String>>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    pub fn user_settings(&self) -> UserSettings {
        self.user_settings.clone()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            author: String::new(),
            description: String::new(),
            event_capacity: default_event_capacity(),
            log_filter: default_log_filter(),
            user_settings: BTreeMap::new(),
        }
    }
}
