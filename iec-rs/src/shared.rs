//! Process-wide state shared by all channels.
//!
//! Owned by the pool and lent to adapters on every refill and cleanup:
//! - the directory entry scratch buffer,
//! - the single filename match traversal,
//! - the handle of a mounted disk image.

use std::fmt;
use std::io;

use tracing::info;

use crate::channel::dir::next_accepted;
use crate::channel::{DirSource, FileHandle};
use crate::dirent::{DirEntry, EntryFilter, EntryScratch};

struct MatchCursor {
    source: Box<dyn DirSource>,
    filter: EntryFilter,
}

struct MountedImage {
    name: String,
    handle: Box<dyn FileHandle>,
}

/// State shared by every channel of a pool.
#[derive(Default)]
pub struct SharedState {
    entry: EntryScratch,
    matcher: Option<MatchCursor>,
    image: Option<MountedImage>,
}

impl SharedState {
    /// Create empty shared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry scratch, holding the entry parsed last.
    pub fn entry(&self) -> &EntryScratch {
        &self.entry
    }

    /// Mutable entry scratch.
    pub fn entry_mut(&mut self) -> &mut EntryScratch {
        &mut self.entry
    }

    /// Start a match traversal and return its first match.
    ///
    /// Only one traversal exists at a time; starting one abandons the
    /// previous traversal.
    pub fn first_match(
        &mut self,
        source: impl DirSource + 'static,
        filter: EntryFilter,
    ) -> io::Result<Option<DirEntry>> {
        self.matcher = Some(MatchCursor {
            source: Box::new(source),
            filter,
        });
        self.next_match()
    }

    /// Continue the current match traversal.
    ///
    /// Returns `None` once exhausted or when no traversal is in flight.
    pub fn next_match(&mut self) -> io::Result<Option<DirEntry>> {
        let Some(cursor) = self.matcher.as_mut() else {
            return Ok(None);
        };

        let next = next_accepted(&mut *cursor.source, &cursor.filter)?;
        if next.is_none() {
            self.matcher = None;
        }
        Ok(next)
    }

    /// Abandon the current match traversal.
    pub fn end_match(&mut self) {
        self.matcher = None;
    }

    /// Check if a match traversal is in flight.
    pub fn is_matching(&self) -> bool {
        self.matcher.is_some()
    }

    /// Mount a disk image, replacing any image mounted before.
    pub fn mount_image(&mut self, name: impl Into<String>, handle: impl FileHandle + 'static) {
        let name = name.into();
        info!(image = %name, "mounted image");
        self.image = Some(MountedImage {
            name,
            handle: Box::new(handle),
        });
    }

    /// Unmount the current image. Returns its name if one was mounted.
    pub fn unmount_image(&mut self) -> Option<String> {
        let image = self.image.take()?;
        info!(image = %image.name, "unmounted image");
        Some(image.name)
    }

    /// Check if an image is mounted.
    pub fn is_mounted(&self) -> bool {
        self.image.is_some()
    }

    /// Name of the mounted image.
    pub fn image_name(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.name.as_str())
    }

    /// Handle of the mounted image.
    pub fn image_mut(&mut self) -> Option<&mut (dyn FileHandle + 'static)> {
        match self.image.as_mut() {
            Some(image) => Some(&mut *image.handle),
            None => None,
        }
    }

    /// Drop all shared state.
    pub fn reset(&mut self) {
        self.entry = EntryScratch::default();
        self.matcher = None;
        if self.image.is_some() {
            self.unmount_image();
        }
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("entry", &self.entry)
            .field("matching", &self.is_matching())
            .field("image", &self.image_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::FileType;
    use std::io::{Cursor, Read, Seek, SeekFrom};

    fn listing() -> Vec<io::Result<DirEntry>> {
        ["GAME1", "NOTES", "GAME2", "GAMES"]
            .iter()
            .map(|n| Ok(DirEntry::new(n.as_bytes(), FileType::Prg, 1)))
            .collect()
    }

    #[test]
    fn test_match_traversal() {
        let mut shared = SharedState::new();
        assert!(!shared.is_matching());
        assert!(shared.next_match().unwrap().is_none());

        let first = shared
            .first_match(listing().into_iter(), EntryFilter::new(&b"GAME?"[..]))
            .unwrap()
            .unwrap();
        assert_eq!(first.name, b"GAME1");
        assert!(shared.is_matching());

        assert_eq!(shared.next_match().unwrap().unwrap().name, b"GAME2");
        assert_eq!(shared.next_match().unwrap().unwrap().name, b"GAMES");
        assert!(shared.next_match().unwrap().is_none());
        assert!(!shared.is_matching());
    }

    #[test]
    fn test_new_traversal_replaces_old() {
        let mut shared = SharedState::new();
        shared
            .first_match(listing().into_iter(), EntryFilter::new(&b"GAME*"[..]))
            .unwrap();

        let notes = shared
            .first_match(listing().into_iter(), EntryFilter::new(&b"N*"[..]))
            .unwrap()
            .unwrap();
        assert_eq!(notes.name, b"NOTES");
        assert!(shared.next_match().unwrap().is_none());

        shared
            .first_match(listing().into_iter(), EntryFilter::all())
            .unwrap();
        shared.end_match();
        assert!(!shared.is_matching());
    }

    #[test]
    fn test_mount_and_unmount() {
        let mut shared = SharedState::new();
        assert!(!shared.is_mounted());
        assert!(shared.image_mut().is_none());

        shared.mount_image("disk.d64", Cursor::new(b"image data".to_vec()));
        assert!(shared.is_mounted());
        assert_eq!(shared.image_name(), Some("disk.d64"));

        let image = shared.image_mut().unwrap();
        image.seek(SeekFrom::Start(6)).unwrap();
        let mut data = String::new();
        image.read_to_string(&mut data).unwrap();
        assert_eq!(data, "data");

        assert_eq!(shared.unmount_image().as_deref(), Some("disk.d64"));
        assert!(shared.unmount_image().is_none());
    }

    #[test]
    fn test_reset() {
        let mut shared = SharedState::new();
        shared.mount_image("disk.d64", Cursor::new(Vec::<u8>::new()));
        shared
            .first_match(listing().into_iter(), EntryFilter::all())
            .unwrap();
        shared
            .entry_mut()
            .load(&DirEntry::new("X", FileType::Seq, 1));

        shared.reset();
        assert!(!shared.is_mounted());
        assert!(!shared.is_matching());
        assert!(shared.entry().name().is_empty());
    }
}
