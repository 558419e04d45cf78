use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::{has_pdf_extension, DocumentRef, Result, ShelfError};

/// Durable home of the uploaded PDF blobs, keyed by filename.
pub trait DocumentStore: Send + Sync {
    /// Stored documents, sorted by name.
    fn list(&self) -> Result<Vec<DocumentRef>>;
    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>>;
    /// Stores `bytes` under `doc`, silently replacing an existing entry.
    fn write(&self, doc: &DocumentRef, bytes: &[u8]) -> Result<()>;

    fn contains(&self, doc: &DocumentRef) -> Result<bool> {
        Ok(self.list()?.iter().any(|entry| entry == doc))
    }

    /// Case-insensitive filename filter; a blank query matches everything.
    fn search(&self, query: &str) -> Result<Vec<DocumentRef>> {
        let needle = query.trim().to_lowercase();
        let docs = self.list()?;
        if needle.is_empty() {
            return Ok(docs);
        }
        Ok(docs
            .into_iter()
            .filter(|doc| doc.name().to_lowercase().contains(&needle))
            .collect())
    }
}

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// The directory is created lazily on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn document_path(&self, doc: &DocumentRef) -> PathBuf {
        self.root.join(doc.name())
    }
}

impl DocumentStore for FsDocumentStore {
    fn list(&self) -> Result<Vec<DocumentRef>> {
        self.ensure_root()?;
        let mut docs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !has_pdf_extension(&name) {
                continue;
            }
            if let Ok(doc) = DocumentRef::new(name) {
                docs.push(doc);
            }
        }
        docs.sort();
        Ok(docs)
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>> {
        match fs::read(self.document_path(doc)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ShelfError::NotFound(doc.name().to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, bytes), fields(root = %self.root.display(), len = bytes.len()))]
    fn write(&self, doc: &DocumentRef, bytes: &[u8]) -> Result<()> {
        self.ensure_root()?;
        let path = self.document_path(doc);
        let tmp = self.root.join(format!(".{}.part", doc.name()));
        let stored = File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = stored {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial upload");
                }
            }
            return Err(err.into());
        }
        debug!(path = %path.display(), "stored document");
        Ok(())
    }

    fn contains(&self, doc: &DocumentRef) -> Result<bool> {
        Ok(self.document_path(doc).is_file())
    }
}

/// Process-local store, used by tests and embedders that keep blobs elsewhere.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<BTreeMap<DocumentRef, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, doc: &DocumentRef) -> Option<Vec<u8>> {
        self.inner.lock().remove(doc)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn list(&self) -> Result<Vec<DocumentRef>> {
        Ok(self.inner.lock().keys().cloned().collect())
    }

    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .get(doc)
            .cloned()
            .ok_or_else(|| ShelfError::NotFound(doc.name().to_owned()))
    }

    fn write(&self, doc: &DocumentRef, bytes: &[u8]) -> Result<()> {
        self.inner.lock().insert(doc.clone(), bytes.to_vec());
        Ok(())
    }

    fn contains(&self, doc: &DocumentRef) -> Result<bool> {
        Ok(self.inner.lock().contains_key(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::new(name).unwrap()
    }

    #[test]
    fn fs_store_creates_directory_on_first_use() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("books");
        let store = FsDocumentStore::new(&root);
        assert!(!root.exists());

        assert!(store.list().unwrap().is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn fs_store_upload_round_trips_bytes_and_lists_once() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path().join("books"));
        let payload = b"%PDF-1.7\nfake body\n%%EOF".to_vec();

        store.write(&doc("a.pdf"), &payload).unwrap();
        store.write(&doc("a.pdf"), &payload).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed, vec![doc("a.pdf")]);
        assert_eq!(store.read(&doc("a.pdf")).unwrap(), payload);
    }

    #[test]
    fn fs_store_overwrites_silently() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.write(&doc("a.pdf"), b"first").unwrap();
        store.write(&doc("a.pdf"), b"second").unwrap();
        assert_eq!(store.read(&doc("a.pdf")).unwrap(), b"second");
    }

    #[test]
    fn fs_store_failed_write_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let blocked = dir.path().join("blocked.pdf");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"k").unwrap();

        let store = FsDocumentStore::new(dir.path());
        assert!(matches!(
            store.write(&doc("blocked.pdf"), b"data"),
            Err(ShelfError::Io(_))
        ));
        assert!(!dir.path().join(".blocked.pdf.part").exists());
        assert!(blocked.join("keep").exists());
    }

    #[test]
    fn fs_store_lists_only_pdf_files_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zeta.pdf"), b"z").unwrap();
        fs::write(dir.path().join("Alpha.PDF"), b"a").unwrap();
        fs::write(dir.path().join("readme.txt"), b"r").unwrap();
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let store = FsDocumentStore::new(dir.path());
        assert_eq!(store.list().unwrap(), vec![doc("Alpha.PDF"), doc("zeta.pdf")]);
    }

    #[test]
    fn fs_store_missing_document_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(matches!(
            store.read(&doc("ghost.pdf")),
            Err(ShelfError::NotFound(name)) if name == "ghost.pdf"
        ));
        assert!(!store.contains(&doc("ghost.pdf")).unwrap());
    }

    #[test]
    fn search_matches_case_insensitive_substrings() {
        let store = MemoryDocumentStore::new();
        for name in ["Rust Book.pdf", "rustonomicon.pdf", "Go Tour.pdf"] {
            store.write(&doc(name), b"x").unwrap();
        }

        assert_eq!(
            store.search("RUST").unwrap(),
            vec![doc("Rust Book.pdf"), doc("rustonomicon.pdf")]
        );
        assert_eq!(store.search("  ").unwrap().len(), 3);
        assert!(store.search("python").unwrap().is_empty());
    }
}
