use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::document::{write_document, Document, DocumentId, SharedDocument};
use crate::error::{DocumentError, LoadError};
use crate::messages::{Messages, Severity};

use super::events::{LoaderBroadcaster, LoaderEvent};

/// Records applied per document per tick.
pub const LOAD_BATCH_SIZE: usize = 50;

/// Stage name reported when the project file is loaded.
pub const PROJECT_FILE_STAGE: &str = "Project File";

/// Progress of one queued document.
///
/// `file` walks the content files in load order; `content_files.len()` is the
/// project file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStage {
    pub file: usize,
    pub records_loaded: usize,
    pub records_left: bool,
}

struct QueuedDocument {
    document: SharedDocument,
    id: DocumentId,
    stage: LoadStage,
}

enum Outcome {
    Advanced(LoadStage, Vec<LoaderEvent>),
    Loaded,
}

/// Incremental loader interleaving any number of queued documents.
///
/// Only the front of the queue is worked on; every [`Loader::load`] call
/// either applies one batch of records or moves the front document to its
/// next file.
pub struct Loader {
    queue: Mutex<VecDeque<QueuedDocument>>,
    things_to_do: Condvar,
    stopped: AtomicBool,
    events: LoaderBroadcaster,
}

impl Loader {
    pub fn new(events: LoaderBroadcaster) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            things_to_do: Condvar::new(),
            stopped: AtomicBool::new(false),
            events,
        }
    }

    pub fn events(&self) -> &LoaderBroadcaster {
        &self.events
    }

    pub fn load_document(&self, document: SharedDocument) -> Result<(), LoadError> {
        if self.is_stopped() {
            return Err(LoadError::Stopped);
        }
        let id = crate::document::read_document(&document)?.id().clone();

        let mut queue = self.lock_queue();
        if queue.iter().any(|q| Arc::ptr_eq(&q.document, &document)) {
            return Err(LoadError::AlreadyQueued);
        }
        debug!("Queued document {} for loading", id);
        queue.push_back(QueuedDocument {
            document,
            id,
            stage: LoadStage::default(),
        });
        self.things_to_do.notify_one();
        Ok(())
    }

    /// Removes `document` from the queue. Documents that are not queued are
    /// left alone and no event is published.
    pub fn abort_loading(&self, document: &SharedDocument) {
        let mut queue = self.lock_queue();
        let Some(pos) = queue.iter().position(|q| Arc::ptr_eq(&q.document, document)) else {
            return;
        };
        let Some(entry) = queue.remove(pos) else {
            return;
        };

        info!("Aborted loading of document {}", entry.id);
        if let Ok(mut doc) = write_document(&entry.document) {
            doc.data.finish_loading();
        }
        // Published under the queue lock so no event of an in-flight tick
        // can follow it.
        self.events.send(LoaderEvent::DocumentNotLoaded {
            document: entry.id,
            error: String::new(),
        });
    }

    pub fn is_queued(&self, document: &SharedDocument) -> bool {
        self.lock_queue()
            .iter()
            .any(|q| Arc::ptr_eq(&q.document, document))
    }

    pub fn has_work(&self) -> bool {
        !self.lock_queue().is_empty()
    }

    /// Current stage of a queued document.
    pub fn stage_of(&self, document: &SharedDocument) -> Option<LoadStage> {
        self.lock_queue()
            .iter()
            .find(|q| Arc::ptr_eq(&q.document, document))
            .map(|q| q.stage)
    }

    /// One scheduling tick. Returns true while documents remain queued.
    pub fn load(&self) -> bool {
        let (document, id, stage) = {
            let queue = self.lock_queue();
            match queue.front() {
                Some(front) => (Arc::clone(&front.document), front.id.clone(), front.stage),
                None => return false,
            }
        };

        let result = write_document(&document).and_then(|mut doc| advance(&mut doc, &id, stage));

        let mut queue = self.lock_queue();
        let still_front = queue
            .front()
            .map(|q| Arc::ptr_eq(&q.document, &document))
            .unwrap_or(false);
        if !still_front {
            // Aborted while this tick was working on it.
            return !queue.is_empty();
        }

        let events = match result {
            Ok(Outcome::Advanced(next, events)) => {
                if let Some(front) = queue.front_mut() {
                    front.stage = next;
                }
                events
            }
            Ok(Outcome::Loaded) => {
                queue.pop_front();
                info!("Document {} loaded", id);
                vec![LoaderEvent::DocumentLoaded { document: id }]
            }
            Err(e) => {
                queue.pop_front();
                warn!("Failed to load document {}: {}", id, e);
                if let Ok(mut doc) = write_document(&document) {
                    doc.data.finish_loading();
                }
                vec![LoaderEvent::DocumentNotLoaded {
                    document: id,
                    error: e.to_string(),
                }]
            }
        };
        // Sent before the lock is released; see `abort_loading`.
        for event in events {
            self.events.send(event);
        }
        !queue.is_empty()
    }

    /// Blocks until a document is queued or the loader is stopped. Returns
    /// false once stopped.
    pub fn wait_for_work(&self) -> bool {
        let mut queue = self.lock_queue();
        while queue.is_empty() && !self.is_stopped() {
            queue = match self.things_to_do.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        !self.is_stopped()
    }

    /// Wakes and ends the loader thread. Queued documents stay queued.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _guard = self.lock_queue();
        self.things_to_do.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<QueuedDocument>> {
        // The queue holds no invariants a panicking tick could break.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderBroadcaster::default())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn advance(document: &mut Document, id: &DocumentId, mut stage: LoadStage) -> Result<Outcome, DocumentError> {
    if stage.records_left {
        let mut messages = Messages::new(Severity::Warning);
        for _ in 0..LOAD_BATCH_SIZE {
            if document.data.continue_loading(&mut messages)? {
                stage.records_left = false;
                break;
            }
            stage.records_loaded += 1;
        }

        let mut events = vec![LoaderEvent::NextRecord {
            document: id.clone(),
            records: stage.records_loaded,
        }];
        events.extend(messages.into_iter().map(|message| LoaderEvent::LoadMessage {
            document: id.clone(),
            message,
        }));
        return Ok(Outcome::Advanced(stage, events));
    }

    let files: Vec<PathBuf> = document.content_files().to_vec();
    let edited = files.len().saturating_sub(1);

    // A new document has nothing on disk for its edited file yet.
    if document.is_new() && stage.file == edited && stage.file < files.len() {
        stage.file += 1;
    }

    if stage.file < files.len() {
        let path = &files[stage.file];
        let steps = document.data.start_loading(path, stage.file < edited, false)?;
        stage.file += 1;
        stage.records_left = true;
        stage.records_loaded = 0;
        return Ok(Outcome::Advanced(
            stage,
            vec![LoaderEvent::NextStage {
                document: id.clone(),
                file_name: file_name(path),
                steps,
            }],
        ));
    }

    let project = document.project_path().to_path_buf();
    if stage.file == files.len() && project.is_file() {
        let steps = document.data.start_loading(&project, false, true)?;
        stage.file += 1;
        stage.records_left = true;
        stage.records_loaded = 0;
        return Ok(Outcome::Advanced(
            stage,
            vec![LoaderEvent::NextStage {
                document: id.clone(),
                file_name: PROJECT_FILE_STAGE.to_string(),
                steps,
            }],
        ));
    }

    document.data.finish_loading();
    Ok(Outcome::Loaded)
}
