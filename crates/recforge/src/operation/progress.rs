use crossbeam_channel::Sender;
use serde::Serialize;

use crate::messages::Message;

/// Kind of an operation, carried on every event it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Save,
    Merge,
    Verify,
    Search,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Save => write!(f, "save"),
            OperationKind::Merge => write!(f, "merge"),
            OperationKind::Verify => write!(f, "verify"),
            OperationKind::Search => write!(f, "search"),
        }
    }
}

/// Events emitted by an operation. For any tick the `Progress` event comes
/// first, followed by that tick's `Message` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperationEvent {
    Progress {
        current: usize,
        max: usize,
        kind: OperationKind,
    },
    Message {
        message: Message,
        kind: OperationKind,
    },
    Done {
        kind: OperationKind,
        failed: bool,
    },
}

pub trait OperationReporter: Send {
    fn report(&self, event: &OperationEvent);
}

/// Forwards events into a channel, e.g. across a thread boundary.
pub struct ChannelReporter {
    sender: Sender<OperationEvent>,
}

impl ChannelReporter {
    pub fn new(sender: Sender<OperationEvent>) -> Self {
        Self { sender }
    }
}

impl OperationReporter for ChannelReporter {
    fn report(&self, event: &OperationEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.sender.send(event.clone());
    }
}
