use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, error, info};

use crate::error::WorkerError;

use super::progress::{ChannelReporter, OperationEvent};
use super::runner::Operation;

/// Runs an [`Operation`] on its own thread, forwarding its events through a
/// channel. Abort requests are picked up between two ticks.
pub struct WorkerOperation<C: Send + 'static> {
    handle: Option<JoinHandle<Operation<C>>>,
    events: Receiver<OperationEvent>,
    abort: Arc<AtomicBool>,
}

impl<C: Send + 'static> WorkerOperation<C> {
    pub fn spawn(mut operation: Operation<C>) -> Result<Self, WorkerError> {
        let (event_tx, event_rx) = unbounded();
        operation.add_reporter(Box::new(ChannelReporter::new(event_tx)));

        let abort = Arc::new(AtomicBool::new(false));
        let abort_flag = Arc::clone(&abort);
        let name = format!("{}-operation", operation.kind());

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_operation(operation, abort_flag))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            events: event_rx,
            abort,
        })
    }

    /// Receiver for the operation's events. Disconnects once the worker
    /// thread has finished.
    pub fn events(&self) -> &Receiver<OperationEvent> {
        &self.events
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Waits for the thread and hands the operation back.
    pub fn join(mut self) -> Result<Operation<C>, WorkerError> {
        let handle = self.handle.take().ok_or(WorkerError::ChannelClosed)?;
        handle.join().map_err(|e| {
            error!("Operation worker panicked: {:?}", e);
            WorkerError::Panicked
        })
    }
}

fn run_operation<C>(mut operation: Operation<C>, abort: Arc<AtomicBool>) -> Operation<C> {
    debug!("{} worker started", operation.kind());

    let mut aborted = false;
    operation.run();
    loop {
        if !aborted && abort.load(Ordering::Relaxed) {
            debug!("{} worker received abort signal", operation.kind());
            operation.abort();
            aborted = true;
        }
        if !operation.step() {
            break;
        }
    }

    info!(
        "{} worker stopped (failed: {})",
        operation.kind(),
        operation.has_error()
    );
    // Disconnects `events()` for receivers iterating until the end.
    operation.clear_reporters();
    operation
}
