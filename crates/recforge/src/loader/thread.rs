use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::error::WorkerError;

use super::scheduler::Loader;

/// Dedicated thread driving a [`Loader`]. Sleeps while the queue is empty.
pub struct LoaderThread {
    loader: Arc<Loader>,
    handle: Option<JoinHandle<()>>,
}

impl LoaderThread {
    pub fn spawn(loader: Arc<Loader>) -> Result<Self, WorkerError> {
        let worker_loader = Arc::clone(&loader);
        let handle = thread::Builder::new()
            .name("loader".to_string())
            .spawn(move || run_loader(worker_loader))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        info!("Started loader thread");
        Ok(Self {
            loader,
            handle: Some(handle),
        })
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Stops the loader and waits for the thread to exit.
    pub fn shutdown(mut self) -> Result<(), WorkerError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), WorkerError> {
        self.loader.stop();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|e| {
                error!("Loader thread panicked: {:?}", e);
                WorkerError::Panicked
            }),
            None => Ok(()),
        }
    }
}

impl Drop for LoaderThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop_and_join();
        }
    }
}

fn run_loader(loader: Arc<Loader>) {
    debug!("Loader thread started");
    while loader.wait_for_work() {
        loader.load();
    }
    debug!("Loader thread stopped");
}
