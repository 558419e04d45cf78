use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pdfshelf_core::{Config, DocumentRef, DocumentStore, FsDocumentStore, Library, Session};
use pdfshelf_render::PdfiumProvider;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod reader;

#[derive(Debug, Parser)]
#[command(name = "pdfshelf", version, about = "Personal PDF library and terminal reader")]
struct Args {
    /// Directory holding the library's PDFs
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Copy PDF files into the library, replacing same-named entries
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List stored PDFs
    List {
        /// Only show documents whose name contains this text (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Export a stored PDF unmodified
    Download {
        name: String,
        /// Destination file (defaults to the stored name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Read a document in a kitty-compatible terminal
    Read {
        /// Document to open; without it the library picker is shown
        name: Option<String>,
        /// Page to start on (1-based)
        #[arg(short, long)]
        page: Option<usize>,
        /// Initial zoom factor
        #[arg(short, long)]
        zoom: Option<f32>,
    },
}

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfshelf", "pdfshelf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let interactive = matches!(args.command, CliCommand::Read { .. });
    let _log_guard = init_logging(&project_dirs, !interactive)?;

    let config = match &args.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file {:?} does not exist", path);
            }
            Config::load(path)?
        }
        None => Config::load_default(&project_dirs)?,
    };
    let library_dir = args
        .library
        .clone()
        .unwrap_or_else(|| config.library_dir(&project_dirs));
    let store = Arc::new(FsDocumentStore::new(library_dir));

    match args.command {
        CliCommand::Upload { files } => upload(store.as_ref(), &files),
        CliCommand::List { search, json } => list(store.as_ref(), search.as_deref(), json),
        CliCommand::Download { name, output } => download(store.as_ref(), &name, output),
        CliCommand::Read { name, page, zoom } => {
            let provider = PdfiumProvider::new()?;
            let download_dir = config.download_dir();
            let library = Arc::new(Library::new(store, Arc::new(provider), config));
            let mut session = Session::new(library);
            if let Some(name) = name {
                let doc = DocumentRef::new(name)?;
                session
                    .open(&doc)
                    .await
                    .with_context(|| format!("failed to open {}", doc))?;
                if let Some(page) = page {
                    let index = page
                        .checked_sub(1)
                        .ok_or_else(|| anyhow!("pages are numbered from 1"))?;
                    session.goto_page(index)?;
                }
                if let Some(zoom) = zoom {
                    session.set_zoom(zoom)?;
                }
            }
            reader::run(session, download_dir).await
        }
    }
}

fn upload(store: &dyn DocumentStore, files: &[PathBuf]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for path in files {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{:?} has no usable file name", path))?;
        let doc = DocumentRef::new(name).with_context(|| format!("cannot upload {:?}", path))?;
        let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        store.write(&doc, &bytes)?;
        info!(document = %doc, len = bytes.len(), "uploaded");
        writeln!(stdout, "uploaded {}", doc)?;
    }
    Ok(())
}

fn list(store: &dyn DocumentStore, search: Option<&str>, json: bool) -> Result<()> {
    let docs = store.search(search.unwrap_or_default())?;
    let mut stdout = io::stdout().lock();
    if json {
        let entries: Vec<ListEntry> = docs
            .iter()
            .map(|doc| ListEntry {
                name: doc.name().to_owned(),
                bytes: store.read(doc).ok().map(|bytes| bytes.len() as u64),
            })
            .collect();
        serde_json::to_writer_pretty(&mut stdout, &entries)?;
        writeln!(stdout)?;
    } else if docs.is_empty() {
        writeln!(stdout, "No books available.")?;
    } else {
        for doc in docs {
            writeln!(stdout, "{}", doc)?;
        }
    }
    Ok(())
}

fn download(store: &dyn DocumentStore, name: &str, output: Option<PathBuf>) -> Result<()> {
    let doc = DocumentRef::new(name)?;
    let bytes = store.read(&doc)?;
    let target = output.unwrap_or_else(|| PathBuf::from(doc.name()));
    write_export(&target, &bytes)?;
    println!("saved {} to {}", doc, target.display());
    Ok(())
}

pub(crate) fn write_export(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {:?}", parent))?;
    }
    fs::write(target, bytes).with_context(|| format!("failed to write {:?}", target))?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = project_dirs.data_local_dir().join("logs");

    let (file_layer, guard) = match fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::never(&log_dir, "pdfshelf.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if guard.is_none() {
        warn!(dir = %log_dir.display(), "log directory unavailable, file logging disabled");
    }
    Ok(guard)
}
