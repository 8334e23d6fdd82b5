use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::broadcast::error::TryRecvError;

use recforge::loader::{Loader, LoaderBroadcaster, LoaderEvent, LoaderThread};
use recforge::operation::{ChannelReporter, WorkerOperation};
use recforge::{
    init_logging, load_settings, saving_operation, spawn_search, spawn_verifier, Document,
    MergeOperation, OperationEvent, Search, Settings, SharedDocument,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "recforge", version, about = "Load, save, merge and inspect content files")]
struct Cli {
    /// Settings file (defaults to <config dir>/recforge/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter, overrides the settings file
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a content file with its dependencies and save it again
    Save {
        /// Project file of the edited content file
        #[arg(long)]
        project: PathBuf,
        /// The edited file does not exist yet
        #[arg(long)]
        new: bool,
        /// Dependencies in load order, the edited file last
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Merge content files into a new one
    Merge {
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long)]
        project: PathBuf,
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Report problems in a content file
    Verify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search record text
    Search {
        pattern: String,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(cli.settings.as_deref())?;

    let filter = cli.log_filter.as_deref().unwrap_or(&settings.log_filter);
    init_logging(filter)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    let loader = Arc::new(Loader::new(LoaderBroadcaster::new(settings.event_capacity)));
    let loader_thread = LoaderThread::spawn(Arc::clone(&loader))?;

    let result = match cli.command {
        Command::Save {
            project,
            new,
            files,
        } => {
            let document = open_document(&loader, &settings, files, project, new, &interrupted)?;
            let worker = WorkerOperation::spawn(saving_operation(document)?)?;
            drive(worker, &interrupted)
        }
        Command::Merge {
            output,
            project,
            sources,
        } => merge(&loader, &settings, output, project, sources, &interrupted),
        Command::Verify { files } => {
            let document = open_document(&loader, &settings, files, PathBuf::new(), false, &interrupted)?;
            drive(spawn_verifier(document, settings.user_settings())?, &interrupted)
        }
        Command::Search {
            pattern,
            regex,
            files,
        } => {
            let search = if regex {
                Search::regex(&pattern)?
            } else {
                Search::text(&pattern)?
            };
            let document = open_document(&loader, &settings, files, PathBuf::new(), false, &interrupted)?;
            drive(spawn_search(document, search, settings.user_settings())?, &interrupted)
        }
    };

    loader_thread.shutdown()?;
    result
}

fn resolve_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        return load_settings(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }
    let default = dirs::config_dir().map(|dir| dir.join("recforge").join("settings.json"));
    match default {
        Some(path) if path.is_file() => load_settings(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        _ => Ok(Settings::default()),
    }
}

/// Queues a document on the loader thread and waits until it has loaded.
fn open_document(
    loader: &Loader,
    settings: &Settings,
    files: Vec<PathBuf>,
    project: PathBuf,
    new: bool,
    interrupted: &AtomicBool,
) -> Result<SharedDocument> {
    let mut document = Document::new(files, project, new);
    document.author = settings.author.clone();
    document.description = settings.description.clone();
    let document = document.into_shared();
    let id = document
        .read()
        .map_err(|_| anyhow::anyhow!("Document lock poisoned"))?
        .id()
        .clone();

    let mut events = loader.events().subscribe();
    loader.load_document(Arc::clone(&document))?;

    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            warn!("Interrupted, aborting load");
            loader.abort_loading(&document);
        }
        match events.try_recv() {
            Ok(event) if event.document() == &id => match event {
                LoaderEvent::DocumentLoaded { .. } => break,
                LoaderEvent::DocumentNotLoaded { error, .. } if error.is_empty() => {
                    bail!("Loading cancelled")
                }
                LoaderEvent::DocumentNotLoaded { error, .. } => bail!("Loading failed: {}", error),
                LoaderEvent::NextStage {
                    file_name, steps, ..
                } => info!("Loading {} ({} records)", file_name, steps),
                LoaderEvent::LoadMessage { message, .. } => print_message(&message),
                LoaderEvent::NextRecord { .. } => {}
            },
            Ok(_) => {}
            Err(TryRecvError::Empty) => thread::sleep(POLL_INTERVAL),
            // Oldest events are dropped first; the final one is kept.
            Err(TryRecvError::Lagged(n)) => warn!("Missed {} loader events", n),
            Err(TryRecvError::Closed) => bail!("Loader stopped"),
        }
    }

    Ok(document)
}

/// Prints one operation event; returns whether it reported a failed run.
fn print_event(event: OperationEvent) -> bool {
    match event {
        OperationEvent::Progress { current, max, kind } => {
            log::debug!("{}: {}/{}", kind, current, max);
            false
        }
        OperationEvent::Message { message, .. } => {
            print_message(&message);
            false
        }
        OperationEvent::Done { kind, failed } => {
            info!("{} finished", kind);
            failed
        }
    }
}

/// Prints a worker's events until it finishes; Ctrl-C aborts it.
fn drive<C: Send + 'static>(worker: WorkerOperation<C>, interrupted: &AtomicBool) -> Result<()> {
    let mut failed = false;
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            warn!("Interrupted, aborting");
            worker.abort();
        }
        match worker.events().recv_timeout(POLL_INTERVAL) {
            Ok(event) => failed |= print_event(event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    worker.join()?;
    if failed {
        bail!("Operation failed");
    }
    Ok(())
}

fn merge(
    loader: &Loader,
    settings: &Settings,
    output: PathBuf,
    project: PathBuf,
    sources: Vec<PathBuf>,
    interrupted: &AtomicBool,
) -> Result<()> {
    let mut documents = Vec::with_capacity(sources.len());
    for source in sources {
        documents.push(open_document(
            loader,
            settings,
            vec![source],
            PathBuf::new(),
            false,
            interrupted,
        )?);
    }

    let mut target = Document::new(vec![output], project, true);
    target.author = settings.author.clone();
    target.description = settings.description.clone();

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let mut merge = MergeOperation::new(documents, target);
    merge.add_reporter(Box::new(ChannelReporter::new(event_tx)));
    let merged = merge.merged();
    merge.run();
    while merge.step() {
        if interrupted.swap(false, Ordering::SeqCst) {
            warn!("Interrupted, aborting merge");
            merge.abort();
        }
        for event in event_rx.try_iter() {
            print_event(event);
        }
    }
    for event in event_rx.try_iter() {
        print_event(event);
    }

    let Ok(document) = merged.try_recv() else {
        bail!("Merge failed");
    };
    let worker = WorkerOperation::spawn(saving_operation(document.into_shared())?)?;
    drive(worker, interrupted)
}

fn print_message(message: &recforge::Message) {
    match &message.subject {
        Some(subject) if !message.hint.is_empty() => println!(
            "[{}] {}: {} ({})",
            message.severity, subject, message.text, message.hint
        ),
        Some(subject) => println!("[{}] {}: {}", message.severity, subject, message.text),
        None => println!("[{}] {}", message.severity, message.text),
    }
}
