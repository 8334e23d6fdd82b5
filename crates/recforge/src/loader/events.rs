use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::document::DocumentId;
use crate::messages::Message;

/// Events published while documents load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoaderEvent {
    DocumentLoaded {
        document: DocumentId,
    },
    /// `error` is empty when loading was cancelled by the user.
    DocumentNotLoaded {
        document: DocumentId,
        error: String,
    },
    NextStage {
        document: DocumentId,
        file_name: String,
        steps: usize,
    },
    NextRecord {
        document: DocumentId,
        records: usize,
    },
    LoadMessage {
        document: DocumentId,
        message: Message,
    },
}

impl LoaderEvent {
    pub fn document(&self) -> &DocumentId {
        match self {
            LoaderEvent::DocumentLoaded { document }
            | LoaderEvent::DocumentNotLoaded { document, .. }
            | LoaderEvent::NextStage { document, .. }
            | LoaderEvent::NextRecord { document, .. }
            | LoaderEvent::LoadMessage { document, .. } => document,
        }
    }
}

/// Broadcasts loader events to any number of subscribers.
#[derive(Clone)]
pub struct LoaderBroadcaster {
    sender: Arc<broadcast::Sender<LoaderEvent>>,
}

impl LoaderBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: LoaderEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for LoaderBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}
