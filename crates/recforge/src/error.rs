use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Save error: {0}")]
    Save(#[from] SaveError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid user setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Malformed record at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record '{id}': {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("File does not start with a header")]
    MissingHeader,

    #[error("Unexpected header at line {0}")]
    UnexpectedHeader(usize),

    #[error("Header already written")]
    HeaderAlreadyWritten,

    #[error("Record '{0}' is still open")]
    RecordOpen(String),

    #[error("No record is open")]
    NoRecordOpen,
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document lock poisoned")]
    Poisoned,

    #[error("Failed to load '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("Failed to decode {kind} record '{id}': {source}")]
    Decode {
        kind: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record stream error: {0}")]
    Codec(#[from] CodecError),

    #[error("Document has no content file to save to")]
    NoSavePath,
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output stream is not open")]
    WriterNotOpen,

    #[error("Merge target has already been handed off")]
    TargetReleased,

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Document is already being saved")]
    AlreadySaving,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Loader has been stopped")]
    Stopped,

    #[error("Document is already queued for loading")]
    AlreadyQueued,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker thread panicked")]
    Panicked,
}

pub type Result<T> = std::result::Result<T, RecforgeError>;
