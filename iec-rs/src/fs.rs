//! Host filesystem adapters.
//!
//! [`HostFs`] exposes a directory of the host as the medium behind the pool:
//! listings become directory channels and files become file channels.
//! [`MemDir`] is an in-memory traversal for callers without a medium.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::vec;

use tracing::debug;

use crate::channel::{DirChannel, FileChannel};
use crate::dirent::{DirEntry, EntryFilter, FileType};
use crate::shared::SharedState;

/// A directory of the host filesystem acting as the medium.
#[derive(Clone, Debug)]
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    /// Use `root` as the medium.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a listing of the root directory.
    pub fn list(&self, filter: EntryFilter) -> io::Result<DirChannel> {
        let dir = HostDir::open(&self.root)?;
        debug!(root = %self.root.display(), entries = dir.len(), "listing directory");
        Ok(DirChannel::new(dir, filter))
    }

    /// Open the first file matching `pattern` for reading.
    ///
    /// The name is resolved through the match traversal of `shared`;
    /// directories are skipped.
    pub fn open_read(&self, shared: &mut SharedState, pattern: &[u8]) -> io::Result<FileChannel> {
        let dir = HostDir::open(&self.root)?;
        let mut found = shared.first_match(dir, EntryFilter::new(pattern))?;
        while let Some(entry) = &found {
            if entry.file_type != FileType::Dir {
                break;
            }
            found = shared.next_match()?;
        }
        shared.end_match();

        let entry = found.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file matches {}", String::from_utf8_lossy(pattern)),
            )
        })?;

        let path = self.path_of(&entry.name);
        debug!(path = %path.display(), size = entry.size, "opening file for reading");
        FileChannel::reader(File::open(path)?)
    }

    /// Create a new file. Fails with `AlreadyExists` if the name is taken.
    pub fn create(&self, name: &str) -> io::Result<FileChannel> {
        let path = self.root.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(path = %path.display(), "created file");
        Ok(FileChannel::writer(file))
    }

    /// Open an existing file for appending.
    pub fn append(&self, name: &str) -> io::Result<FileChannel> {
        let path = self.root.join(name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        debug!(path = %path.display(), "opened file for appending");
        FileChannel::appender(file)
    }

    fn path_of(&self, name: &[u8]) -> PathBuf {
        self.root.join(String::from_utf8_lossy(name).as_ref())
    }
}

/// Snapshot of a host directory, sorted by name.
#[derive(Debug)]
pub struct HostDir {
    entries: vec::IntoIter<DirEntry>,
}

impl HostDir {
    /// Read the entries of `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();

            let file_type = if meta.is_dir() {
                FileType::Dir
            } else {
                host_file_type(&name)
            };
            let mut dirent = DirEntry::new(name, file_type, meta.len());
            dirent.locked = meta.permissions().readonly();
            entries.push(dirent);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            entries: entries.into_iter(),
        })
    }

    /// Entries not yet visited.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if every entry was visited.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

impl Iterator for HostDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(Ok)
    }
}

fn host_file_type(name: &str) -> FileType {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_uppercase);
    match ext.as_deref() {
        Some("SEQ") => FileType::Seq,
        Some("USR") => FileType::Usr,
        Some("REL") => FileType::Rel,
        _ => FileType::Prg,
    }
}

/// In-memory directory traversal.
#[derive(Clone, Debug, Default)]
pub struct MemDir {
    entries: Vec<DirEntry>,
    next: usize,
}

impl MemDir {
    /// Create a traversal over `entries` in the order given.
    pub fn new(entries: impl IntoIterator<Item = DirEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            next: 0,
        }
    }
}

impl Iterator for MemDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.next)?.clone();
        self.next += 1;
        Some(Ok(entry))
    }
}
