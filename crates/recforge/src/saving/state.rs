use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::RecordWriter;
use crate::document::SharedDocument;
use crate::error::StageError;
use crate::operation::ErrorFlag;

pub type FileWriter = RecordWriter<BufWriter<File>>;

/// Appends `.tmp` to the full file name.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Renames `from` over `to`, falling back to copy and remove when the
/// rename is refused (e.g. across filesystems).
pub fn move_file(from: &Path, to: &Path) -> Result<(), StageError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to).map_err(|e| StageError::MoveFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    fs::remove_file(from).map_err(|e| StageError::MoveFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Output side of one in-flight save.
///
/// Holds the writer for whichever file is currently open and the per-cell
/// index of collated references shared by the reference and cell stages.
pub struct SavingState {
    project_path: PathBuf,
    content_path: PathBuf,
    writer: Option<FileWriter>,
    path: PathBuf,
    tmp_path: PathBuf,
    project_file: bool,
    /// Lower-cased cell id -> reference indices. Stayed references sit in
    /// front of moved ones.
    pub sub_records: HashMap<String, VecDeque<usize>>,
}

impl SavingState {
    pub fn new(project_path: PathBuf, content_path: PathBuf) -> Self {
        Self {
            project_path,
            content_path,
            writer: None,
            path: PathBuf::new(),
            tmp_path: PathBuf::new(),
            project_file: false,
            sub_records: HashMap::new(),
        }
    }

    /// Opens the project file in place, or a temp file beside the content
    /// file.
    pub fn open(&mut self, project_file: bool) -> Result<(), StageError> {
        self.writer = None;
        self.project_file = project_file;
        if project_file {
            self.path = self.project_path.clone();
            self.tmp_path = self.project_path.clone();
        } else {
            self.path = self.content_path.clone();
            self.tmp_path = temp_path_for(&self.content_path);
        }

        if let Some(parent) = self.tmp_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let file = File::create(&self.tmp_path).map_err(|e| StageError::Io {
            path: self.tmp_path.clone(),
            source: e,
        })?;
        debug!("Opened {} for writing", self.tmp_path.display());
        self.writer = Some(RecordWriter::new(BufWriter::new(file)));
        Ok(())
    }

    pub fn writer(&mut self) -> Result<&mut FileWriter, StageError> {
        self.writer.as_mut().ok_or(StageError::WriterNotOpen)
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Flushes and syncs the open file.
    pub fn close(&mut self) -> Result<(), StageError> {
        let writer = self.writer.take().ok_or(StageError::WriterNotOpen)?;
        let buffered = writer.close()?;
        let file = buffered.into_inner().map_err(|e| StageError::Io {
            path: self.tmp_path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all().map_err(|e| StageError::Io {
            path: self.tmp_path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Drops the writer without flushing.
    pub fn discard(&mut self) {
        self.writer = None;
    }

    /// Destination of the file currently being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where bytes actually go; equals `path()` for the project file.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn is_project_file(&self) -> bool {
        self.project_file
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }
}

/// Context every save stage works on.
pub struct SaveContext {
    pub document: SharedDocument,
    pub state: SavingState,
    /// The operation's error flag, read by the final stage.
    pub error: ErrorFlag,
}
