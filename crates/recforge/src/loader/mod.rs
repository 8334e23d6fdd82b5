//! Incremental multi-document loading.

pub mod events;
pub mod scheduler;
pub mod thread;

pub use events::{LoaderBroadcaster, LoaderEvent};
pub use scheduler::{LoadStage, Loader, LOAD_BATCH_SIZE, PROJECT_FILE_STAGE};
pub use thread::LoaderThread;
