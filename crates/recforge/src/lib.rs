pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod messages;
pub mod operation;
pub mod saving;
pub mod tools;

pub use codec::{Header, RecordKind, RecordReader, RecordWriter};
pub use config::{load_settings, Settings};
pub use document::{Data, Document, DocumentId, SharedDocument};
pub use error::{
    CodecError, ConfigError, DocumentError, LoadError, RecforgeError, Result, SaveError,
    StageError, WorkerError,
};
pub use loader::{Loader, LoaderBroadcaster, LoaderEvent, LoaderThread};
pub use logging::init_logging;
pub use merge::MergeOperation;
pub use messages::{Message, Messages, Severity};
pub use operation::{
    Operation, OperationEvent, OperationKind, OperationReporter, OperationState, Stage,
    UserSettings, WorkerOperation,
};
pub use saving::saving_operation;
pub use tools::{search_operation, spawn_search, spawn_verifier, verifier_operation, Search};
